use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use super::schema::PageMetadata;

pub const DOC_ID_TOKEN: &str = "{{DOC_ID}}";
pub const PAGE_ID_TOKEN: &str = "{{PAGE_ID}}";
pub const PAGE_TEXT_TOKEN: &str = "{{PAGE_TEXT}}";
pub const PAGE_TYPE_TOKEN: &str = "{{PAGE_TYPE}}";
pub const OVERVIEW_TOKEN: &str = "{{FINANCIAL_STRUCTURE_OVERVIEW}}";

const PLACEHOLDER_TOKENS: &[&str] = &[
    DOC_ID_TOKEN,
    PAGE_ID_TOKEN,
    PAGE_TEXT_TOKEN,
    PAGE_TYPE_TOKEN,
    OVERVIEW_TOKEN,
];

pub const CLASSIFIER_TEMPLATE_FILE: &str = "classifier_prompt.txt";
pub const EXTRACTION_TEMPLATE_FILE: &str = "extraction_prompt.txt";

pub const CLASSIFIER_SYSTEM_PROMPT: &str = "You are a precise assistant that classifies historical \
ledger pages and must respond with STRICT JSON only.";

pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are a precise assistant that extracts structured \
ledger entries and must respond with STRICT JSON only.";

pub const DEFAULT_CLASSIFIER_TEMPLATE: &str = r#"You are reading one transcribed page of a
historical account ledger kept in pounds, shillings and pence.

Document: {{DOC_ID}}
Page: {{PAGE_ID}}

Classify the page layout:
- "Full_Balance_Sheet": a summary or balance page with totals carried or balanced.
- "Sectional_List": an itemised list of individual receipts or payments.
- "Unknown": neither of the above can be determined.

Respond with a JSON object with exactly these keys:
{
  "page_type": "Full_Balance_Sheet | Sectional_List | Unknown",
  "financial_structure_overview": "two or three sentences describing columns, sections and totals"
}

<page>
{{PAGE_TEXT}}
</page>
"#;

pub const DEFAULT_EXTRACTION_TEMPLATE: &str = r#"You are extracting individual entries from one
transcribed page of a historical account ledger kept in pounds (l.), shillings (s.)
and pence (d.).

Document: {{DOC_ID}}
Page: {{PAGE_ID}}
Page type: {{PAGE_TYPE}}
Structure overview: {{FINANCIAL_STRUCTURE_OVERVIEW}}

Rules:
- One row per ledger entry, in reading order, numbered from 0 in "row_id".
- Copy the description verbatim.
- "transaction_type" is "Credit", "Debit" or "Unknown".
- Use null for any amount that is not written. Never write 0 for a missing amount.
- "pence_fraction" is one of "q", "d", "1/4", "1/2", "3/4" or null.
- Every "model_conf_*" value is your confidence in that field between 0.0 and 1.0.

Respond with a JSON object:
{
  "rows": [
    {
      "row_id": 0,
      "description": "...",
      "transaction_type": "Credit | Debit | Unknown",
      "pounds": null,
      "shillings": null,
      "pence": null,
      "pence_fraction": null,
      "model_conf_description": 0.0,
      "model_conf_transaction_type": 0.0,
      "model_conf_pounds": 0.0,
      "model_conf_shillings": 0.0,
      "model_conf_pence": 0.0,
      "model_conf_pence_fraction": 0.0
    }
  ]
}

<page>
{{PAGE_TEXT}}
</page>
"#;

#[derive(Debug, Clone)]
pub struct PromptTemplates {
    pub classifier: String,
    pub extraction: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            classifier: DEFAULT_CLASSIFIER_TEMPLATE.to_string(),
            extraction: DEFAULT_EXTRACTION_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Loads both templates from `dir`, or the built-in ones when `dir` is `None`.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let Some(dir) = dir else {
            return Ok(Self::default());
        };

        let templates = Self {
            classifier: read_template(&dir.join(CLASSIFIER_TEMPLATE_FILE))?,
            extraction: read_template(&dir.join(EXTRACTION_TEMPLATE_FILE))?,
        };
        info!(dir = %dir.display(), "loaded prompt templates");
        Ok(templates)
    }
}

fn read_template(path: &Path) -> Result<String> {
    let template = fs::read_to_string(path)
        .with_context(|| format!("failed to read prompt template {}", path.display()))?;
    if !template.contains(PAGE_TEXT_TOKEN) {
        bail!(
            "prompt template {} does not contain {}",
            path.display(),
            PAGE_TEXT_TOKEN
        );
    }
    Ok(template)
}

/// Substitution is literal and non-escaping; page text goes in last so tokens inside it
/// are never expanded.
pub fn render_classifier_prompt(
    template: &str,
    doc_id: &str,
    page_id: u32,
    page_text: &str,
) -> String {
    warn_on_embedded_tokens(doc_id, page_id, page_text);

    template
        .replace(DOC_ID_TOKEN, doc_id)
        .replace(PAGE_ID_TOKEN, &page_id.to_string())
        .replace(PAGE_TEXT_TOKEN, page_text)
}

pub fn render_extraction_prompt(
    template: &str,
    page_meta: &PageMetadata,
    page_text: &str,
) -> String {
    warn_on_embedded_tokens(&page_meta.doc_id, page_meta.page_id, page_text);

    template
        .replace(DOC_ID_TOKEN, &page_meta.doc_id)
        .replace(PAGE_ID_TOKEN, &page_meta.page_id.to_string())
        .replace(PAGE_TYPE_TOKEN, page_meta.page_type.as_str())
        .replace(OVERVIEW_TOKEN, &page_meta.financial_structure_overview)
        .replace(PAGE_TEXT_TOKEN, page_text)
}

fn warn_on_embedded_tokens(doc_id: &str, page_id: u32, page_text: &str) {
    let embedded: Vec<&str> = PLACEHOLDER_TOKENS
        .iter()
        .copied()
        .filter(|token| page_text.contains(token))
        .collect();
    if !embedded.is_empty() {
        warn!(
            doc_id,
            page_id,
            tokens = %embedded.join(","),
            "page text contains prompt placeholder tokens"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::schema::PageType;

    #[test]
    fn classifier_prompt_fills_all_tokens() {
        let prompt = render_classifier_prompt(
            DEFAULT_CLASSIFIER_TEMPLATE,
            "1704",
            3,
            "Rec'd of Mr Hale 2 6 8",
        );
        assert!(prompt.contains("Document: 1704"));
        assert!(prompt.contains("Page: 3"));
        assert!(prompt.contains("Rec'd of Mr Hale 2 6 8"));
        assert!(!prompt.contains(DOC_ID_TOKEN));
        assert!(!prompt.contains(PAGE_ID_TOKEN));
        assert!(!prompt.contains(PAGE_TEXT_TOKEN));
    }

    #[test]
    fn extraction_prompt_carries_classifier_output() {
        let meta = PageMetadata {
            doc_id: "1712".to_string(),
            page_id: 4,
            page_type: PageType::FullBalanceSheet,
            financial_structure_overview: "Two columns, debtor and creditor".to_string(),
        };
        let prompt = render_extraction_prompt(DEFAULT_EXTRACTION_TEMPLATE, &meta, "Total 40 0 0");
        assert!(prompt.contains("Page type: Full_Balance_Sheet"));
        assert!(prompt.contains("Structure overview: Two columns, debtor and creditor"));
        assert!(prompt.contains("Total 40 0 0"));
        assert!(!prompt.contains(OVERVIEW_TOKEN));
        assert!(!prompt.contains(PAGE_TYPE_TOKEN));
    }

    #[test]
    fn page_text_is_substituted_last() {
        let prompt = render_classifier_prompt("[{{PAGE_TEXT}}]", "1704", 1, "literal {{DOC_ID}}");
        assert_eq!(prompt, "[literal {{DOC_ID}}]");
    }

    #[test]
    fn loading_without_dir_uses_defaults() {
        let templates = PromptTemplates::load(None).unwrap();
        assert_eq!(templates.classifier, DEFAULT_CLASSIFIER_TEMPLATE);
        assert_eq!(templates.extraction, DEFAULT_EXTRACTION_TEMPLATE);
    }

    #[test]
    fn loading_rejects_template_without_page_text() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CLASSIFIER_TEMPLATE_FILE), "no page here").unwrap();
        fs::write(dir.path().join(EXTRACTION_TEMPLATE_FILE), "{{PAGE_TEXT}}").unwrap();

        let error = PromptTemplates::load(Some(dir.path())).unwrap_err();
        assert!(error.to_string().contains(PAGE_TEXT_TOKEN));
    }

    #[test]
    fn loading_reads_both_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CLASSIFIER_TEMPLATE_FILE), "C {{PAGE_TEXT}}").unwrap();
        fs::write(dir.path().join(EXTRACTION_TEMPLATE_FILE), "E {{PAGE_TEXT}}").unwrap();

        let templates = PromptTemplates::load(Some(dir.path())).unwrap();
        assert_eq!(templates.classifier, "C {{PAGE_TEXT}}");
        assert_eq!(templates.extraction, "E {{PAGE_TEXT}}");
    }
}
