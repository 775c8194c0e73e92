//! Decode-with-defaults for the two structured service responses.
//!
//! Raw JSON never leaves this module: callers get either a typed value or a
//! `DecodeError` describing why the response was unusable.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use super::schema::{
    LedgerRow, ModelConfidences, PageMetadata, PageType, PenceFraction, TransactionType,
};

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("response is not a JSON object")]
    NotAnObject,

    #[error("response has no `rows` array")]
    MissingRows,

    #[error("response contains no usable rows")]
    NoRows,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResponse {
    pub page_type: PageType,
    pub financial_structure_overview: String,
}

pub fn decode_classification(raw: &str) -> Result<ClassificationResponse, DecodeError> {
    let object = parse_object(raw)?;

    let page_type = object
        .get("page_type")
        .and_then(Value::as_str)
        .map(PageType::from_label)
        .unwrap_or(PageType::Unknown);

    let financial_structure_overview = object
        .get("financial_structure_overview")
        .map(text_of)
        .unwrap_or_default();

    Ok(ClassificationResponse {
        page_type,
        financial_structure_overview,
    })
}

/// Rows come back with placeholder zero for both derived confidences; the extractor
/// finalizes them.
pub fn decode_rows(raw: &str, page_meta: &PageMetadata) -> Result<Vec<LedgerRow>, DecodeError> {
    let object = parse_object(raw)?;
    let entries = object
        .get("rows")
        .and_then(Value::as_array)
        .ok_or(DecodeError::MissingRows)?;

    let mut rows = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let Some(fields) = entry.as_object() else {
            warn!(
                doc_id = %page_meta.doc_id,
                page_id = page_meta.page_id,
                index,
                "skipping non-object row in extraction response"
            );
            continue;
        };
        rows.push(decode_row(fields, index, page_meta));
    }

    if rows.is_empty() {
        return Err(DecodeError::NoRows);
    }
    Ok(rows)
}

fn decode_row(fields: &Map<String, Value>, index: usize, page_meta: &PageMetadata) -> LedgerRow {
    let doc_id = fields
        .get("doc_id")
        .filter(|value| !value.is_null())
        .map(text_of)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| page_meta.doc_id.clone());

    let page_id = fields
        .get("page_id")
        .and_then(integer_of)
        .and_then(|value| u32::try_from(value).ok())
        .filter(|value| *value > 0)
        .unwrap_or(page_meta.page_id);

    let row_id = fields
        .get("row_id")
        .and_then(integer_of)
        .unwrap_or(index as i64);

    let description = fields
        .get("description")
        .filter(|value| !value.is_null())
        .map(text_of)
        .unwrap_or_default();

    let transaction_type = fields
        .get("transaction_type")
        .and_then(Value::as_str)
        .map(TransactionType::from_label)
        .unwrap_or(TransactionType::Unknown);

    let pence_fraction = fields
        .get("pence_fraction")
        .and_then(Value::as_str)
        .and_then(PenceFraction::from_label);

    LedgerRow {
        doc_id,
        page_id,
        row_id,
        description,
        transaction_type,
        pounds: fields.get("pounds").and_then(integer_of),
        shillings: fields.get("shillings").and_then(integer_of),
        pence: fields.get("pence").and_then(integer_of),
        pence_fraction,
        model_confidence: ModelConfidences {
            description: confidence_of(fields, "model_conf_description"),
            transaction_type: confidence_of(fields, "model_conf_transaction_type"),
            pounds: confidence_of(fields, "model_conf_pounds"),
            shillings: confidence_of(fields, "model_conf_shillings"),
            pence: confidence_of(fields, "model_conf_pence"),
            pence_fraction: confidence_of(fields, "model_conf_pence_fraction"),
        },
        rule_based_confidence: 0.0,
        row_confidence: 0.0,
    }
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, DecodeError> {
    match serde_json::from_str::<Value>(raw.trim())? {
        Value::Object(object) => Ok(object),
        _ => Err(DecodeError::NotAnObject),
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Integers, integral floats and numeric strings. Anything else is treated as absent.
fn integer_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite() && float.fract() == 0.0)
                .map(|float| float as i64)
        }),
        Value::String(text) => {
            let trimmed = text.trim();
            trimmed.parse::<i64>().ok().or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|float| float.is_finite() && float.fract() == 0.0)
                    .map(|float| float as i64)
            })
        }
        _ => None,
    }
}

fn confidence_of(fields: &Map<String, Value>, key: &str) -> f64 {
    let raw = match fields.get(key) {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    };

    raw.filter(|value| value.is_finite())
        .map(|value| value.clamp(0.0, 1.0))
        .unwrap_or(0.0)
}
