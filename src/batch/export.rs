use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use tracing::info;

use crate::ledger::schema::{LedgerRow, PageMetadata};
use crate::util::ensure_directory;

pub const ROWS_SHEET: &str = "rows";
pub const PAGE_METADATA_SHEET: &str = "page_metadata";

const ROW_HEADERS: [&str; 17] = [
    "doc_id",
    "page_id",
    "row_id",
    "description",
    "transaction_type",
    "pounds",
    "shillings",
    "pence",
    "pence_fraction",
    "model_conf_description",
    "model_conf_transaction_type",
    "model_conf_pounds",
    "model_conf_shillings",
    "model_conf_pence",
    "model_conf_pence_fraction",
    "rule_based_confidence",
    "row_confidence",
];

const PAGE_HEADERS: [&str; 4] = ["doc_id", "page_id", "page_type", "financial_structure_overview"];

/// Persists the aggregated run output.
pub trait TabularExporter {
    /// Returns the path written.
    fn export(&self, pages: &[PageMetadata], rows: &[LedgerRow]) -> Result<PathBuf>;
}

/// Two-sheet workbook: every row on `rows`, one line per page on `page_metadata`.
pub struct XlsxExporter {
    output_path: PathBuf,
}

impl XlsxExporter {
    pub fn new(output_path: &Path) -> Self {
        Self {
            output_path: output_path.to_path_buf(),
        }
    }
}

impl TabularExporter for XlsxExporter {
    fn export(&self, pages: &[PageMetadata], rows: &[LedgerRow]) -> Result<PathBuf> {
        if let Some(parent) = self.output_path.parent() {
            ensure_directory(parent)?;
        }

        let mut workbook = build_workbook(pages, rows).context("failed to build workbook")?;
        workbook
            .save(&self.output_path)
            .with_context(|| format!("failed to save {}", self.output_path.display()))?;

        info!(
            path = %self.output_path.display(),
            rows = rows.len(),
            pages = pages.len(),
            "wrote workbook"
        );
        Ok(self.output_path.clone())
    }
}

fn build_workbook(pages: &[PageMetadata], rows: &[LedgerRow]) -> Result<Workbook, XlsxError> {
    let header_format = Format::new().set_bold();
    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name(ROWS_SHEET)?;
    write_headers(sheet, &ROW_HEADERS, &header_format)?;
    for (index, row) in rows.iter().enumerate() {
        write_ledger_row(sheet, index as u32 + 1, row)?;
    }

    let sheet = workbook.add_worksheet();
    sheet.set_name(PAGE_METADATA_SHEET)?;
    write_headers(sheet, &PAGE_HEADERS, &header_format)?;
    for (index, page) in pages.iter().enumerate() {
        let line = index as u32 + 1;
        sheet.write_string(line, 0, &page.doc_id)?;
        sheet.write_number(line, 1, page.page_id)?;
        sheet.write_string(line, 2, page.page_type.as_str())?;
        sheet.write_string(line, 3, &page.financial_structure_overview)?;
    }

    Ok(workbook)
}

fn write_headers(
    sheet: &mut Worksheet,
    headers: &[&str],
    format: &Format,
) -> Result<(), XlsxError> {
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, format)?;
    }
    sheet.set_freeze_panes(1, 0)?;
    Ok(())
}

fn write_ledger_row(sheet: &mut Worksheet, line: u32, row: &LedgerRow) -> Result<(), XlsxError> {
    sheet.write_string(line, 0, &row.doc_id)?;
    sheet.write_number(line, 1, row.page_id)?;
    sheet.write_number(line, 2, row.row_id as f64)?;
    sheet.write_string(line, 3, &row.description)?;
    sheet.write_string(line, 4, row.transaction_type.as_str())?;

    // Absent amounts stay blank; zero is a real value.
    for (col, amount) in [(5, row.pounds), (6, row.shillings), (7, row.pence)] {
        if let Some(value) = amount {
            sheet.write_number(line, col, value as f64)?;
        }
    }
    if let Some(fraction) = row.pence_fraction {
        sheet.write_string(line, 8, fraction.as_str())?;
    }

    for (offset, confidence) in row.model_confidence.as_array().into_iter().enumerate() {
        sheet.write_number(line, 9 + offset as u16, confidence)?;
    }
    sheet.write_number(line, 15, row.rule_based_confidence)?;
    sheet.write_number(line, 16, row.row_confidence)?;
    Ok(())
}
