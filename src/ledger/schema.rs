use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum PageType {
    #[serde(rename = "Full_Balance_Sheet")]
    FullBalanceSheet,
    #[serde(rename = "Sectional_List")]
    SectionalList,
    Unknown,
}

impl PageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullBalanceSheet => "Full_Balance_Sheet",
            Self::SectionalList => "Sectional_List",
            Self::Unknown => "Unknown",
        }
    }

    /// Exact-match lookup against the service vocabulary. Anything else is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label {
            "Full_Balance_Sheet" => Self::FullBalanceSheet,
            "Sectional_List" => Self::SectionalList,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Credit,
    Debit,
    Unknown,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Credit => "Credit",
            Self::Debit => "Debit",
            Self::Unknown => "Unknown",
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label {
            "Credit" => Self::Credit,
            "Debit" => Self::Debit,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-penny notations found in the ledgers: farthing markers and explicit fractions.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum PenceFraction {
    #[serde(rename = "q")]
    Q,
    #[serde(rename = "d")]
    D,
    #[serde(rename = "1/4")]
    Quarter,
    #[serde(rename = "1/2")]
    Half,
    #[serde(rename = "3/4")]
    ThreeQuarters,
}

impl PenceFraction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Q => "q",
            Self::D => "d",
            Self::Quarter => "1/4",
            Self::Half => "1/2",
            Self::ThreeQuarters => "3/4",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "q" => Some(Self::Q),
            "d" => Some(Self::D),
            "1/4" => Some(Self::Quarter),
            "1/2" => Some(Self::Half),
            "3/4" => Some(Self::ThreeQuarters),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub doc_id: String,
    pub page_id: u32,
    pub page_type: PageType,
    pub financial_structure_overview: String,
}

/// Per-field confidences as self-reported by the extraction service.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelConfidences {
    pub description: f64,
    pub transaction_type: f64,
    pub pounds: f64,
    pub shillings: f64,
    pub pence: f64,
    pub pence_fraction: f64,
}

impl ModelConfidences {
    pub fn as_array(&self) -> [f64; 6] {
        [
            self.description,
            self.transaction_type,
            self.pounds,
            self.shillings,
            self.pence,
            self.pence_fraction,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub doc_id: String,
    pub page_id: u32,
    pub row_id: i64,
    pub description: String,
    pub transaction_type: TransactionType,
    pub pounds: Option<i64>,
    pub shillings: Option<i64>,
    pub pence: Option<i64>,
    pub pence_fraction: Option<PenceFraction>,
    pub model_confidence: ModelConfidences,
    /// Derived by the scorer; zero until the row is finalized.
    pub rule_based_confidence: f64,
    /// Derived by the scorer; zero until the row is finalized.
    pub row_confidence: f64,
}

impl LedgerRow {
    pub fn has_any_amount(&self) -> bool {
        self.pounds.is_some() || self.shillings.is_some() || self.pence.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_type_labels_round_trip_through_serde() {
        let json = serde_json::to_string(&PageType::FullBalanceSheet).unwrap();
        assert_eq!(json, "\"Full_Balance_Sheet\"");
        let parsed: PageType = serde_json::from_str("\"Sectional_List\"").unwrap();
        assert_eq!(parsed, PageType::SectionalList);
    }

    #[test]
    fn page_type_from_label_is_exact_match() {
        assert_eq!(PageType::from_label("Full_Balance_Sheet"), PageType::FullBalanceSheet);
        assert_eq!(PageType::from_label("full_balance_sheet"), PageType::Unknown);
        assert_eq!(PageType::from_label("Ledger"), PageType::Unknown);
        assert_eq!(PageType::from_label(""), PageType::Unknown);
    }

    #[test]
    fn transaction_type_unrecognized_is_unknown() {
        assert_eq!(TransactionType::from_label("Debit"), TransactionType::Debit);
        assert_eq!(TransactionType::from_label("Refund"), TransactionType::Unknown);
    }

    #[test]
    fn pence_fraction_accepts_the_five_notations() {
        for label in ["q", "d", "1/4", "1/2", "3/4"] {
            let fraction = PenceFraction::from_label(label).unwrap();
            assert_eq!(fraction.as_str(), label);
        }
        assert_eq!(PenceFraction::from_label("1/3"), None);
        let json = serde_json::to_string(&PenceFraction::ThreeQuarters).unwrap();
        assert_eq!(json, "\"3/4\"");
    }
}
