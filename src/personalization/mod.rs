//! Effective fusion weights for one inference call.
//!
//! Three layers, applied in order: system defaults, the patient's stored
//! overrides, then a fixed list of heuristic context deltas. The heuristic
//! pass is deterministic (the same accumulated context always yields the
//! same adjustment) and every adjustment is capped so no single modality
//! can run away. A caller-supplied weight map
//! always takes precedence over the adapted values.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::config;
use crate::models::{PatientProfile, RiskVector};
use crate::store::{PatientSettingsStore, StoreError};

/// No heuristic may push a weight past this multiple of its pre-heuristic
/// value.
pub const MAX_ADJUSTMENT: f64 = 2.0;

/// One deterministic context rule: if the accumulated context text
/// contains any keyword, multiply the named weight by `factor`.
struct HeuristicDelta {
    keywords: &'static [&'static str],
    weight_key: &'static str,
    factor: f64,
}

/// Applied in order; order matters only for readability since the deltas
/// touch independent keys.
const CONTEXT_DELTAS: &[HeuristicDelta] = &[
    HeuristicDelta {
        keywords: &["imaging", "scan", "radiology"],
        weight_key: "image",
        factor: 1.25,
    },
    HeuristicDelta {
        keywords: &["glucose", "a1c", "lab panel"],
        weight_key: "tabular",
        factor: 1.15,
    },
    HeuristicDelta {
        keywords: &["follow-up note", "journal"],
        weight_key: "text",
        factor: 1.10,
    },
];

/// Derives the effective fusion weight map for a patient.
pub struct WeightAdapter {
    store: Arc<PatientSettingsStore>,
}

impl WeightAdapter {
    pub fn new(store: Arc<PatientSettingsStore>) -> Self {
        Self { store }
    }

    /// Defaults ← stored overrides ← heuristic context deltas.
    /// Store reads fail open, so this only errors for invalid patient ids.
    pub fn effective_weights(
        &self,
        patient_id: &str,
    ) -> Result<BTreeMap<String, f64>, StoreError> {
        let profile = self.store.load(patient_id)?;
        Ok(adapt(&profile))
    }
}

/// Pure adaptation pass over an already-loaded profile.
pub fn adapt(profile: &PatientProfile) -> BTreeMap<String, f64> {
    let mut base = config::default_weights();
    for (key, value) in &profile.weights {
        base.insert(key.clone(), *value);
    }

    let context = accumulated_context_text(profile);
    let mut adapted = base.clone();
    for delta in CONTEXT_DELTAS {
        if delta.keywords.iter().any(|kw| context.contains(kw)) {
            let pre = *base.get(delta.weight_key).unwrap_or(&1.0);
            let entry = adapted.entry(delta.weight_key.to_string()).or_insert(pre);
            *entry = (*entry * delta.factor).min(pre * MAX_ADJUSTMENT);
            tracing::debug!(
                patient_id = %profile.patient_id,
                weight = delta.weight_key,
                factor = delta.factor,
                adjusted = *entry,
                "Context heuristic applied"
            );
        }
    }
    adapted
}

/// Merge a per-request caller map over the adapted weights; caller keys win.
pub fn resolve(
    adapted: BTreeMap<String, f64>,
    caller: Option<&BTreeMap<String, f64>>,
) -> BTreeMap<String, f64> {
    let mut resolved = adapted;
    if let Some(overrides) = caller {
        for (key, value) in overrides {
            resolved.insert(key.clone(), *value);
        }
    }
    resolved
}

/// Per-condition stored multipliers applied to an already-fused vector
/// (condition-name keys in the patient's weight map; unknown conditions
/// keep weight 1.0). Results stay clamped to [0, 1].
pub fn apply_condition_weights(
    mut risk: RiskVector,
    weights: &BTreeMap<String, f64>,
) -> RiskVector {
    for (condition, p) in risk.iter_mut() {
        let weight = weights.get(condition).copied().unwrap_or(1.0);
        *p = (*p * weight).clamp(0.0, 1.0);
    }
    risk
}

/// Lowercased concatenation of every textual context snapshot. Non-string
/// snapshots contribute their JSON rendering so metric names still match.
pub fn accumulated_context_text(profile: &PatientProfile) -> String {
    let mut text = String::new();
    for value in profile
        .history_context
        .values()
        .chain(profile.image_context.values())
    {
        match value {
            Value::String(s) => text.push_str(s),
            other => text.push_str(&other.to_string()),
        }
        text.push(' ');
    }
    text.to_lowercase()
}
