use tracing::{debug, warn};

use super::decode::decode_rows;
use super::prompt::{EXTRACTION_SYSTEM_PROMPT, render_extraction_prompt};
use super::schema::{LedgerRow, ModelConfidences, PageMetadata, PageType, TransactionType};
use super::scorer::{ScoringConfig, finalize_row};
use super::service::{CompletionRequest, GenerativeService};
use super::{StageFailure, Traced};

const FALLBACK_DESCRIPTION_CONFIDENCE: f64 = 0.3;
const FALLBACK_TRANSACTION_TYPE_CONFIDENCE: f64 = 0.2;

pub struct RowExtractor<'a> {
    service: &'a dyn GenerativeService,
    template: &'a str,
    model: &'a str,
    scoring: ScoringConfig,
}

impl<'a> RowExtractor<'a> {
    pub fn new(
        service: &'a dyn GenerativeService,
        template: &'a str,
        model: &'a str,
        scoring: ScoringConfig,
    ) -> Self {
        Self {
            service,
            template,
            model,
            scoring,
        }
    }

    /// Never empty; every returned row has both derived confidences filled in.
    pub fn extract(&self, page_meta: &PageMetadata, page_text: &str) -> Vec<LedgerRow> {
        self.extract_traced(page_meta, page_text).value
    }

    pub fn extract_traced(
        &self,
        page_meta: &PageMetadata,
        page_text: &str,
    ) -> Traced<Vec<LedgerRow>> {
        let mut traced = match self.request(page_meta, page_text) {
            Ok(rows) => {
                debug!(
                    doc_id = %page_meta.doc_id,
                    page_id = page_meta.page_id,
                    rows = rows.len(),
                    "rows extracted"
                );
                Traced::service(rows)
            }
            Err(failure) => {
                warn!(
                    doc_id = %page_meta.doc_id,
                    page_id = page_meta.page_id,
                    error = %failure,
                    "extraction failed, using placeholder row"
                );
                Traced::fallback(vec![fallback_row(page_meta)], &failure)
            }
        };

        for row in &mut traced.value {
            finalize_row(row, &self.scoring);
        }
        traced
    }

    fn request(
        &self,
        page_meta: &PageMetadata,
        page_text: &str,
    ) -> Result<Vec<LedgerRow>, StageFailure> {
        let prompt = render_extraction_prompt(self.template, page_meta, page_text);
        let raw = self.service.complete(&CompletionRequest {
            model: self.model,
            system: EXTRACTION_SYSTEM_PROMPT,
            prompt: &prompt,
            json_mode: true,
        })?;
        Ok(decode_rows(&raw, page_meta)?)
    }
}

/// The single low-confidence row standing in for a page whose extraction failed.
pub fn fallback_row(page_meta: &PageMetadata) -> LedgerRow {
    let description = match page_meta.page_type {
        PageType::FullBalanceSheet => format!(
            "Placeholder balance entry for {} page; inferred from summary-like page text.",
            page_meta.page_type
        ),
        PageType::SectionalList | PageType::Unknown => format!(
            "Placeholder transaction for {} page; inferred from list-like page text.",
            page_meta.page_type
        ),
    };

    LedgerRow {
        doc_id: page_meta.doc_id.clone(),
        page_id: page_meta.page_id,
        row_id: 0,
        description,
        transaction_type: TransactionType::Unknown,
        pounds: None,
        shillings: None,
        pence: None,
        pence_fraction: None,
        model_confidence: ModelConfidences {
            description: FALLBACK_DESCRIPTION_CONFIDENCE,
            transaction_type: FALLBACK_TRANSACTION_TYPE_CONFIDENCE,
            ..ModelConfidences::default()
        },
        rule_based_confidence: 0.0,
        row_confidence: 0.0,
    }
}
