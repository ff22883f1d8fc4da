//! Weighted fusion of per-modality probability maps into one risk vector.
//!
//! This is a weighted combination, not a convex one: weights are not
//! required to sum to 1, so a confident single-modality signal is not
//! diluted just because the other modalities are silent. Missing keys
//! contribute 0.0, malformed contributions degrade to 0.0 with a warning,
//! and every output value is clamped into [0, 1].

use std::collections::BTreeMap;

use crate::models::RiskVector;

/// Modality weight lookup; unknown modalities fall back to 1.0.
pub fn weight_for(weights: &BTreeMap<String, f64>, modality: &str) -> f64 {
    weights
        .get(modality)
        .copied()
        .filter(|w| w.is_finite())
        .unwrap_or(1.0)
}

/// Combine tabular, text-derived, and image-derived condition maps using
/// the effective weight map. Empty inputs yield an empty vector, never an
/// error.
pub fn combine(
    tabular: &RiskVector,
    text: &RiskVector,
    image: &RiskVector,
    weights: &BTreeMap<String, f64>,
) -> RiskVector {
    let w_tabular = weight_for(weights, "tabular");
    let w_text = weight_for(weights, "text");
    let w_image = weight_for(weights, "image");

    let mut keys: Vec<&String> = tabular.keys().chain(text.keys()).chain(image.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut fused = RiskVector::new();
    for key in keys {
        let sum = contribution(tabular, key, w_tabular, "tabular")
            + contribution(text, key, w_text, "text")
            + contribution(image, key, w_image, "image");
        fused.insert(key.clone(), sum.clamp(0.0, 1.0));
    }
    fused
}

/// One modality's weighted contribution for one condition. A missing key
/// is 0.0; a non-finite probability from a misbehaving modality is logged
/// and treated as 0.0 so fusion never aborts.
fn contribution(map: &RiskVector, key: &str, weight: f64, modality: &str) -> f64 {
    match map.get(key) {
        None => 0.0,
        Some(p) if p.is_finite() => weight * p,
        Some(p) => {
            tracing::warn!(
                condition = key,
                modality,
                value = *p,
                "Non-finite modality contribution, treating as 0"
            );
            0.0
        }
    }
}
