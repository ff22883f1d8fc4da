//! Preventive recommendations and severity bands.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Severity band, determined by comparing a score against the patient's
/// own thresholds. Declaration order gives `Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Base value for composite ranking.
    pub fn base_score(self) -> f64 {
        match self {
            Severity::Low => 0.2,
            Severity::Medium => 0.6,
            Severity::High => 0.9,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// One preventive recommendation. The `code` is a stable identifier;
/// within a request, firings sharing a code are merged before ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub code: String,
    pub title: String,
    pub text: String,
    pub severity: Severity,
    /// Human-readable justifications, in rule evaluation order.
    pub reasons: Vec<String>,
    /// Tags like "diet", "exercise", "screening", "urgent".
    pub categories: BTreeSet<String>,
}

impl Recommendation {
    /// Merge another firing of the same code into this one: union of
    /// reasons (order-preserving) and categories, highest severity wins.
    pub fn absorb(&mut self, other: Recommendation) {
        debug_assert_eq!(self.code, other.code);
        for reason in other.reasons {
            if !self.reasons.contains(&reason) {
                self.reasons.push(reason);
            }
        }
        self.categories.extend(other.categories);
        self.severity = self.severity.max(other.severity);
    }
}
