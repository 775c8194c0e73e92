use tracing::{debug, warn};

use super::decode::{ClassificationResponse, decode_classification};
use super::prompt::{CLASSIFIER_SYSTEM_PROMPT, render_classifier_prompt};
use super::schema::{PageMetadata, PageType};
use super::service::{CompletionRequest, GenerativeService};
use super::{StageFailure, Traced};

const BALANCE_FALLBACK_OVERVIEW: &str =
    "Fallback: classified as balance/summary page based on presence of 'total' or 'balance'.";
const LIST_FALLBACK_OVERVIEW: &str =
    "Fallback: classified as list page using simple keyword heuristic.";

pub struct PageClassifier<'a> {
    service: &'a dyn GenerativeService,
    template: &'a str,
    model: &'a str,
}

impl<'a> PageClassifier<'a> {
    pub fn new(service: &'a dyn GenerativeService, template: &'a str, model: &'a str) -> Self {
        Self {
            service,
            template,
            model,
        }
    }

    /// Always returns well-formed metadata; service trouble degrades to the keyword heuristic.
    pub fn classify(&self, doc_id: &str, page_id: u32, page_text: &str) -> PageMetadata {
        self.classify_traced(doc_id, page_id, page_text).value
    }

    pub fn classify_traced(
        &self,
        doc_id: &str,
        page_id: u32,
        page_text: &str,
    ) -> Traced<PageMetadata> {
        match self.request(doc_id, page_id, page_text) {
            Ok(response) => {
                debug!(doc_id, page_id, page_type = %response.page_type, "page classified");
                Traced::service(PageMetadata {
                    doc_id: doc_id.to_string(),
                    page_id,
                    page_type: response.page_type,
                    financial_structure_overview: response.financial_structure_overview,
                })
            }
            Err(failure) => {
                warn!(
                    doc_id,
                    page_id,
                    error = %failure,
                    "classification failed, using keyword fallback"
                );
                Traced::fallback(heuristic_classification(doc_id, page_id, page_text), &failure)
            }
        }
    }

    fn request(
        &self,
        doc_id: &str,
        page_id: u32,
        page_text: &str,
    ) -> Result<ClassificationResponse, StageFailure> {
        let prompt = render_classifier_prompt(self.template, doc_id, page_id, page_text);
        let raw = self.service.complete(&CompletionRequest {
            model: self.model,
            system: CLASSIFIER_SYSTEM_PROMPT,
            prompt: &prompt,
            json_mode: true,
        })?;
        Ok(decode_classification(&raw)?)
    }
}

/// Pages mentioning a total or a balance are summary pages; everything else is a list.
pub fn heuristic_classification(doc_id: &str, page_id: u32, page_text: &str) -> PageMetadata {
    let normalized = page_text.to_lowercase();
    let (page_type, overview) = if normalized.contains("total") || normalized.contains("balance") {
        (PageType::FullBalanceSheet, BALANCE_FALLBACK_OVERVIEW)
    } else {
        (PageType::SectionalList, LIST_FALLBACK_OVERVIEW)
    };

    PageMetadata {
        doc_id: doc_id.to_string(),
        page_id,
        page_type,
        financial_structure_overview: overview.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_detects_balance_keywords_case_insensitively() {
        let meta = heuristic_classification("1704", 1, "The BALANCE carried forward");
        assert_eq!(meta.page_type, PageType::FullBalanceSheet);
        assert!(meta.financial_structure_overview.starts_with("Fallback:"));

        let meta = heuristic_classification("1704", 1, "Totals for Michaelmas");
        assert_eq!(meta.page_type, PageType::FullBalanceSheet);
    }

    #[test]
    fn heuristic_defaults_to_sectional_list() {
        let meta = heuristic_classification("1704", 2, "Paid the glazier 0 3 4");
        assert_eq!(meta.page_type, PageType::SectionalList);
        assert!(meta.financial_structure_overview.starts_with("Fallback:"));
    }

    #[test]
    fn heuristic_handles_empty_text() {
        let meta = heuristic_classification("1704", 9, "");
        assert_eq!(meta.page_type, PageType::SectionalList);
        assert_eq!(meta.doc_id, "1704");
        assert_eq!(meta.page_id, 9);
    }
}
