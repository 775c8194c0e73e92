use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::info;

use super::Source;
use super::classifier::PageClassifier;
use super::extractor::RowExtractor;
use super::schema::{LedgerRow, PageMetadata, PageType};

/// Where a page's metadata and rows came from.
#[derive(Debug, Clone, Serialize)]
pub struct PageProvenance {
    pub doc_id: String,
    pub page_id: u32,
    pub page_type: PageType,
    pub classification: Source,
    pub extraction: Source,
    pub row_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentRun {
    pub pages: Vec<PageMetadata>,
    pub rows: Vec<LedgerRow>,
    pub provenance: Vec<PageProvenance>,
}

pub struct DocumentPipeline<'a> {
    classifier: PageClassifier<'a>,
    extractor: RowExtractor<'a>,
}

impl<'a> DocumentPipeline<'a> {
    pub fn new(classifier: PageClassifier<'a>, extractor: RowExtractor<'a>) -> Self {
        Self {
            classifier,
            extractor,
        }
    }

    pub fn process_page(
        &self,
        doc_id: &str,
        page_id: u32,
        page_text: &str,
    ) -> (PageMetadata, Vec<LedgerRow>) {
        let (meta, rows, _) = self.process_page_traced(doc_id, page_id, page_text);
        (meta, rows)
    }

    /// Classify, then extract conditioned on that classification.
    pub fn process_page_traced(
        &self,
        doc_id: &str,
        page_id: u32,
        page_text: &str,
    ) -> (PageMetadata, Vec<LedgerRow>, PageProvenance) {
        let classified = self.classifier.classify_traced(doc_id, page_id, page_text);
        let extracted = self.extractor.extract_traced(&classified.value, page_text);

        let provenance = PageProvenance {
            doc_id: doc_id.to_string(),
            page_id,
            page_type: classified.value.page_type,
            classification: classified.source,
            extraction: extracted.source,
            row_count: extracted.value.len(),
        };

        (classified.value, extracted.value, provenance)
    }

    pub fn process_document(
        &self,
        doc_id: &str,
        pages: &HashMap<u32, String>,
    ) -> (Vec<PageMetadata>, Vec<LedgerRow>) {
        let ordered: BTreeMap<u32, &str> = pages
            .iter()
            .map(|(page_id, text)| (*page_id, text.as_str()))
            .collect();
        let run = self.process_document_traced(doc_id, &ordered);
        (run.pages, run.rows)
    }

    /// Pages are processed in ascending page id order, which `BTreeMap` guarantees.
    pub fn process_document_traced(
        &self,
        doc_id: &str,
        pages: &BTreeMap<u32, &str>,
    ) -> DocumentRun {
        let mut run = DocumentRun::default();

        for (&page_id, &page_text) in pages {
            let (meta, rows, provenance) = self.process_page_traced(doc_id, page_id, page_text);
            run.pages.push(meta);
            run.rows.extend(rows);
            run.provenance.push(provenance);
        }

        info!(
            doc_id,
            pages = run.pages.len(),
            rows = run.rows.len(),
            fallbacks = run
                .provenance
                .iter()
                .filter(|entry| {
                    entry.classification.is_fallback() || entry.extraction.is_fallback()
                })
                .count(),
            "document processed"
        );

        run
    }
}
