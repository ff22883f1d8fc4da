//! Risk vectors and prediction formatting.
//!
//! A risk vector maps condition names to probabilities in `[0, 1]`. It is
//! produced fresh per inference request and never persisted by this
//! subsystem.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Condition name → probability in `[0, 1]`.
pub type RiskVector = BTreeMap<String, f64>;

/// One entity surfaced by the text extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub entity: String,
    pub label: String,
}

/// One formatted prediction line for API responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRisk {
    pub condition: String,
    pub probability: f64,
}

/// Round to 4 decimals for presentation, matching the stored history format.
pub fn round4(p: f64) -> f64 {
    (p * 10_000.0).round() / 10_000.0
}

/// Sort a risk vector descending by probability and keep the top `k`.
/// Ties break by condition name so output is deterministic.
pub fn top_k(risk: &RiskVector, k: usize) -> Vec<RankedRisk> {
    let mut ranked: Vec<RankedRisk> = risk
        .iter()
        .map(|(condition, p)| RankedRisk {
            condition: condition.clone(),
            probability: round4(*p),
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.condition.cmp(&b.condition))
    });
    ranked.truncate(k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round4_truncates_noise() {
        assert_eq!(round4(0.123_456), 0.1235);
        assert_eq!(round4(0.5), 0.5);
    }

    #[test]
    fn top_k_sorts_descending_and_bounds() {
        let risk = RiskVector::from([
            ("flu".to_string(), 0.2),
            ("diabetes".to_string(), 0.8),
            ("cardiac".to_string(), 0.5),
        ]);
        let ranked = top_k(&risk, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].condition, "diabetes");
        assert_eq!(ranked[1].condition, "cardiac");
    }

    #[test]
    fn top_k_ties_break_by_name() {
        let risk = RiskVector::from([
            ("b_cond".to_string(), 0.4),
            ("a_cond".to_string(), 0.4),
        ]);
        let ranked = top_k(&risk, 5);
        assert_eq!(ranked[0].condition, "a_cond");
        assert_eq!(ranked[1].condition, "b_cond");
    }

    #[test]
    fn top_k_of_empty_is_empty() {
        assert!(top_k(&RiskVector::new(), 3).is_empty());
    }
}
