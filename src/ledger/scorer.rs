use super::schema::LedgerRow;

pub const DEFAULT_RULE_WEIGHT: f64 = 0.4;

const EMPTY_DESCRIPTION_PENALTY: f64 = 0.4;
const SHORT_DESCRIPTION_PENALTY: f64 = 0.2;
const SHILLINGS_RANGE_PENALTY: f64 = 0.2;
const PENCE_RANGE_PENALTY: f64 = 0.2;
const POUNDS_OUTLIER_PENALTY: f64 = 0.2;
const NO_AMOUNT_PENALTY: f64 = 0.3;

/// Pounds above this multiple of the typical maximum are treated as outliers.
const POUNDS_OUTLIER_FACTOR: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringConfig {
    pub rule_weight: f64,
    pub typical_max_pounds: Option<i64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            rule_weight: DEFAULT_RULE_WEIGHT,
            typical_max_pounds: None,
        }
    }
}

/// Structural sanity score in [0, 1].
///
/// Penalties are additive and independent; the clamp is applied once, at the end,
/// so several small problems can together bring a row to 0.0.
///
/// An out-of-vocabulary transaction type also costs 0.3, but `TransactionType`
/// cannot represent one: decode normalizes unknown labels to `Unknown`, which is valid.
pub fn rule_score(row: &LedgerRow, typical_max_pounds: Option<i64>) -> f64 {
    let mut score = 1.0_f64;

    let description_len = row.description.trim().chars().count();
    if description_len == 0 {
        score -= EMPTY_DESCRIPTION_PENALTY;
    } else if description_len < 3 {
        score -= SHORT_DESCRIPTION_PENALTY;
    }

    if row.shillings.is_some_and(|shillings| !(0..=19).contains(&shillings)) {
        score -= SHILLINGS_RANGE_PENALTY;
    }

    if row.pence.is_some_and(|pence| !(0..=11).contains(&pence)) {
        score -= PENCE_RANGE_PENALTY;
    }

    if let (Some(typical), Some(pounds)) = (typical_max_pounds, row.pounds) {
        if pounds > typical.saturating_mul(POUNDS_OUTLIER_FACTOR) {
            score -= POUNDS_OUTLIER_PENALTY;
        }
    }

    if !row.has_any_amount() {
        score -= NO_AMOUNT_PENALTY;
    }

    score.clamp(0.0, 1.0)
}

/// Unweighted mean of the six model-reported confidences.
pub fn model_confidence_mean(row: &LedgerRow) -> f64 {
    let values = row.model_confidence.as_array();
    values.iter().sum::<f64>() / values.len() as f64
}

/// `rule_weight * rule_score + (1 - rule_weight) * mean(model confidences)`, in [0, 1].
pub fn blended_score(row: &LedgerRow, rule_weight: f64, typical_max_pounds: Option<i64>) -> f64 {
    let rule = rule_score(row, typical_max_pounds);
    let model = model_confidence_mean(row);
    let weight = if rule_weight.is_nan() {
        DEFAULT_RULE_WEIGHT
    } else {
        rule_weight.clamp(0.0, 1.0)
    };

    (weight * rule + (1.0 - weight) * model).clamp(0.0, 1.0)
}

/// Fills both derived confidence fields. Every row leaving the extractor goes through here.
pub fn finalize_row(row: &mut LedgerRow, config: &ScoringConfig) {
    row.rule_based_confidence = rule_score(row, config.typical_max_pounds);
    row.row_confidence = blended_score(row, config.rule_weight, config.typical_max_pounds);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::schema::{ModelConfidences, TransactionType};

    fn valid_row() -> LedgerRow {
        LedgerRow {
            doc_id: "1704".to_string(),
            page_id: 1,
            row_id: 0,
            description: "To cash received of Mr Hale".to_string(),
            transaction_type: TransactionType::Credit,
            pounds: Some(12),
            shillings: Some(6),
            pence: Some(8),
            pence_fraction: None,
            model_confidence: ModelConfidences {
                description: 0.9,
                transaction_type: 0.8,
                pounds: 0.7,
                shillings: 0.6,
                pence: 0.5,
                pence_fraction: 0.4,
            },
            rule_based_confidence: 0.0,
            row_confidence: 0.0,
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn clean_row_scores_one() {
        assert_eq!(rule_score(&valid_row(), None), 1.0);
    }

    #[test]
    fn empty_description_and_no_amounts_scores_point_three() {
        let mut row = valid_row();
        row.description = String::new();
        row.transaction_type = TransactionType::Unknown;
        row.pounds = None;
        row.shillings = None;
        row.pence = None;

        assert!(approx(rule_score(&row, None), 0.3));
    }

    #[test]
    fn whitespace_only_description_counts_as_empty() {
        let mut row = valid_row();
        row.description = "   ".to_string();
        assert!(approx(rule_score(&row, None), 0.6));
    }

    #[test]
    fn short_description_penalised_once() {
        let mut row = valid_row();
        row.description = "To".to_string();
        assert!(approx(rule_score(&row, None), 0.8));
    }

    #[test]
    fn shillings_out_of_range_scores_point_eight() {
        let mut row = valid_row();
        row.shillings = Some(25);
        assert!(approx(rule_score(&row, None), 0.8));
    }

    #[test]
    fn negative_pence_penalised() {
        let mut row = valid_row();
        row.pence = Some(-1);
        assert!(approx(rule_score(&row, None), 0.8));
    }

    #[test]
    fn boundary_values_are_in_range() {
        let mut row = valid_row();
        row.shillings = Some(19);
        row.pence = Some(11);
        assert_eq!(rule_score(&row, None), 1.0);

        row.shillings = Some(20);
        row.pence = Some(12);
        assert!(approx(rule_score(&row, None), 0.6));
    }

    #[test]
    fn pounds_outlier_only_checked_with_typical_max() {
        let mut row = valid_row();
        row.pounds = Some(400);
        assert_eq!(rule_score(&row, None), 1.0);
        assert!(approx(rule_score(&row, Some(100)), 0.8));
        assert_eq!(rule_score(&row, Some(200)), 1.0);
    }

    #[test]
    fn penalties_stack_and_clamp_at_zero() {
        let mut row = valid_row();
        row.description = String::new();
        row.shillings = Some(40);
        row.pence = Some(30);
        row.pounds = Some(10_000);

        // 1.0 - 0.4 - 0.2 - 0.2 - 0.2 = 0.0 before clamp
        assert!(approx(rule_score(&row, Some(10)), 0.0));

        row.pounds = None;
        row.shillings = None;
        row.pence = None;
        row.description = "x".to_string();
        assert!(approx(rule_score(&row, None), 0.5));
    }

    #[test]
    fn rule_score_is_deterministic() {
        let mut row = valid_row();
        row.shillings = Some(25);
        let first = rule_score(&row, Some(5));
        for _ in 0..10 {
            assert_eq!(rule_score(&row, Some(5)), first);
        }
    }

    #[test]
    fn blended_with_full_rule_weight_equals_rule_score() {
        let mut row = valid_row();
        row.shillings = Some(25);
        assert_eq!(blended_score(&row, 1.0, None), rule_score(&row, None));
    }

    #[test]
    fn blended_with_zero_rule_weight_equals_model_mean() {
        let row = valid_row();
        let expected = (0.9 + 0.8 + 0.7 + 0.6 + 0.5 + 0.4) / 6.0;
        assert_eq!(blended_score(&row, 0.0, None), expected);
    }

    #[test]
    fn blended_default_weight_mixes_both() {
        let row = valid_row();
        let expected = 0.4 * 1.0 + 0.6 * ((0.9 + 0.8 + 0.7 + 0.6 + 0.5 + 0.4) / 6.0);
        assert!(approx(blended_score(&row, DEFAULT_RULE_WEIGHT, None), expected));
    }

    #[test]
    fn rule_weight_is_clamped() {
        let row = valid_row();
        assert_eq!(blended_score(&row, 3.0, None), blended_score(&row, 1.0, None));
        assert_eq!(blended_score(&row, -2.0, None), blended_score(&row, 0.0, None));
    }

    #[test]
    fn finalize_fills_both_fields_within_bounds() {
        let mut row = valid_row();
        row.description = String::new();
        row.pounds = None;
        row.shillings = None;
        row.pence = None;

        finalize_row(&mut row, &ScoringConfig::default());

        assert!(approx(row.rule_based_confidence, 0.3));
        assert!((0.0..=1.0).contains(&row.row_confidence));
        assert!(row.row_confidence > 0.0);
    }
}
