//! Per-patient personalization aggregate: fusion weights, severity
//! thresholds, free-form clinical profile, append-only context, and the
//! audit trail of every mutation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config;

/// Severity band cutoffs in `[0, 1]`. Invariant: `low < medium < high`,
/// enforced at the update boundary before anything is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Thresholds {
    /// Ascending, non-overlapping, and inside the unit interval.
    pub fn is_valid(&self) -> bool {
        let in_range =
            |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        in_range(self.low)
            && in_range(self.medium)
            && in_range(self.high)
            && self.low < self.medium
            && self.medium < self.high
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low: 0.2,
            medium: 0.5,
            high: 0.75,
        }
    }
}

/// One audit trail entry. Written exactly once per mutating save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// RFC 3339 timestamp of the change.
    pub timestamp: String,
    /// Who requested the change (clinician id, "system", ...).
    pub author: String,
    /// Which sections changed, e.g. "weights(2)" or "thresholds".
    pub change_summary: String,
}

/// The full personalization state for one patient.
///
/// Lazily created with defaults on first read; mutated only through
/// explicit store operations; never deleted by this subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub patient_id: String,
    /// Modality or condition name → positive multiplier. Keys absent here
    /// fall back to the system defaults, then to 1.0.
    pub weights: BTreeMap<String, f64>,
    pub thresholds: Thresholds,
    /// Free-form demographic/clinical facts (age, bmi, ...). Opaque except
    /// for the named fields the rule engine explicitly reads.
    pub profile: BTreeMap<String, Value>,
    /// Append-only, timestamp-keyed snapshots of textual visit context.
    #[serde(default)]
    pub history_context: BTreeMap<String, Value>,
    /// Append-only, timestamp-keyed image-derived metrics.
    #[serde(default)]
    pub image_context: BTreeMap<String, Value>,
    #[serde(default)]
    pub audit_trail: Vec<AuditRecord>,
}

impl PatientProfile {
    /// Fresh default-initialized profile for a patient with no persisted state.
    pub fn with_defaults(patient_id: &str) -> Self {
        Self {
            patient_id: patient_id.to_string(),
            weights: config::default_weights(),
            thresholds: Thresholds::default(),
            profile: BTreeMap::new(),
            history_context: BTreeMap::new(),
            image_context: BTreeMap::new(),
            audit_trail: Vec::new(),
        }
    }
}

/// Read a numeric field from a free-form profile map, tolerating numbers
/// stored as JSON strings. Malformed values yield `None` so the caller can
/// skip the dependent rule instead of failing the request.
pub fn numeric_field(profile: &BTreeMap<String, Value>, key: &str) -> Option<f64> {
    match profile.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_thresholds_are_valid() {
        assert!(Thresholds::default().is_valid());
    }

    #[test]
    fn unordered_thresholds_rejected() {
        let t = Thresholds {
            low: 0.5,
            medium: 0.4,
            high: 0.3,
        };
        assert!(!t.is_valid());
    }

    #[test]
    fn out_of_range_thresholds_rejected() {
        let t = Thresholds {
            low: -0.1,
            medium: 0.5,
            high: 0.75,
        };
        assert!(!t.is_valid());
        let t = Thresholds {
            low: 0.2,
            medium: 0.5,
            high: 1.5,
        };
        assert!(!t.is_valid());
    }

    #[test]
    fn defaults_profile_has_system_weights() {
        let profile = PatientProfile::with_defaults("p-001");
        assert_eq!(profile.weights.get("tabular"), Some(&0.5));
        assert!(profile.audit_trail.is_empty());
        assert!(profile.history_context.is_empty());
    }

    #[test]
    fn numeric_field_reads_numbers_and_strings() {
        let mut profile = BTreeMap::new();
        profile.insert("age".to_string(), json!(62));
        profile.insert("bmi".to_string(), json!("27.4"));
        profile.insert("name".to_string(), json!("A. Patient"));

        assert_eq!(numeric_field(&profile, "age"), Some(62.0));
        assert_eq!(numeric_field(&profile, "bmi"), Some(27.4));
        assert_eq!(numeric_field(&profile, "name"), None);
        assert_eq!(numeric_field(&profile, "missing"), None);
    }

    #[test]
    fn profile_roundtrips_through_json() {
        let mut profile = PatientProfile::with_defaults("p-json");
        profile.profile.insert("age".into(), json!(55));
        profile.audit_trail.push(AuditRecord {
            timestamp: "2026-08-30T10:00:00Z".into(),
            author: "dr-a".into(),
            change_summary: "profile(1)".into(),
        });

        let text = serde_json::to_string(&profile).unwrap();
        let back: PatientProfile = serde_json::from_str(&text).unwrap();
        assert_eq!(back, profile);
    }
}
