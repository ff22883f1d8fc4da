//! Deterministic in-process model backend.
//!
//! Keyword lexicons for text and imaging, piecewise-linear ramps for
//! tabular features, and leading-sentence extraction for summaries.
//! Meant as a dependable default so the service runs without any
//! external model server.

use std::collections::BTreeMap;

use crate::models::risk::RiskVector;
use crate::models::Entity;
use crate::text;

use super::{AdapterError, ImageModel, Summarizer, TabularModel, TextModel};

/// Per-condition keyword lexicon. Each matched keyword contributes one
/// hit; the condition score is `(hits * 0.3).min(0.9)`.
const CONDITION_LEXICON: &[(&str, &[&str])] = &[
    (
        "diabetes",
        &[
            "diabetes",
            "glucose",
            "a1c",
            "hyperglycemia",
            "polyuria",
            "thirst",
            "insulin",
        ],
    ),
    (
        "hypertension",
        &[
            "hypertension",
            "blood pressure",
            "systolic",
            "diastolic",
            "headache",
            "dizziness",
        ],
    ),
    (
        "cardiac",
        &[
            "chest pain",
            "palpitations",
            "arrhythmia",
            "shortness of breath",
            "angina",
            "tachycardia",
        ],
    ),
    (
        "flu",
        &["fever", "cough", "chills", "sore throat", "fatigue", "body aches"],
    ),
    (
        "obesity",
        &["obesity", "overweight", "weight gain", "bmi"],
    ),
];

const KEYWORD_SCORE: f64 = 0.3;
const KEYWORD_CAP: f64 = 0.9;

/// Linear ramp: 0 at or below `floor`, 1 at or above `ceil`.
fn ramp(value: f64, floor: f64, ceil: f64) -> f64 {
    if value <= floor {
        0.0
    } else if value >= ceil {
        1.0
    } else {
        (value - floor) / (ceil - floor)
    }
}

pub struct LexiconModel {
    _private: (),
}

impl LexiconModel {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for LexiconModel {
    fn default() -> Self {
        Self::new()
    }
}

impl TabularModel for LexiconModel {
    fn predict_proba(&self, features: &BTreeMap<String, f64>) -> Result<RiskVector, AdapterError> {
        let mut scores = RiskVector::new();

        if let Some(glucose) = features.get("glucose") {
            // fasting mg/dL: 100 normal cutoff, 200 diagnostic
            scores.insert("diabetes".into(), ramp(*glucose, 100.0, 200.0));
        }
        if let Some(systolic) = features.get("systolic_bp") {
            scores.insert("hypertension".into(), ramp(*systolic, 120.0, 180.0));
        }
        if let Some(bmi) = features.get("bmi") {
            scores.insert("obesity".into(), ramp(*bmi, 25.0, 40.0));
        }
        if let Some(age) = features.get("age") {
            let age_factor = ramp(*age, 40.0, 80.0);
            if age_factor > 0.0 {
                let cardiac = scores.get("cardiac").copied().unwrap_or(0.0);
                scores.insert("cardiac".into(), (cardiac + 0.4 * age_factor).min(1.0));
            }
        }

        Ok(scores)
    }
}

impl TextModel for LexiconModel {
    fn extract_entities(&self, input: &str) -> Result<Vec<Entity>, AdapterError> {
        let normalized = text::preprocess_pipeline(input);
        let mut entities = Vec::new();
        for (condition, keywords) in CONDITION_LEXICON {
            for keyword in *keywords {
                if normalized.contains(keyword) {
                    entities.push(Entity {
                        entity: keyword.to_string(),
                        label: condition.to_string(),
                    });
                }
            }
        }
        Ok(entities)
    }

    fn predict_conditions(&self, entities: &[Entity]) -> Result<RiskVector, AdapterError> {
        let mut scores = RiskVector::new();
        for entity in entities {
            let hit = scores.entry(entity.label.clone()).or_insert(0.0);
            *hit = (*hit + KEYWORD_SCORE).min(KEYWORD_CAP);
        }
        Ok(scores)
    }
}

impl Summarizer for LexiconModel {
    fn summarize(&self, input: &str) -> Result<String, AdapterError> {
        let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
        // first three sentences, extractive
        let mut summary = String::new();
        let mut sentences = 0;
        for chunk in collapsed.split_inclusive(['.', '!', '?']) {
            summary.push_str(chunk);
            sentences += 1;
            if sentences == 3 {
                break;
            }
        }
        if summary.is_empty() {
            summary = collapsed;
        }
        Ok(summary.trim().to_string())
    }
}

impl ImageModel for LexiconModel {
    fn predict_image(&self, image_ref: &str) -> Result<RiskVector, AdapterError> {
        // Score off tokens in the reference itself (file names carry the
        // study type in every dataset we ingest).
        let lowered = image_ref.to_lowercase();
        let mut scores = RiskVector::new();
        if lowered.contains("chest") || lowered.contains("cardiac") || lowered.contains("ecg") {
            scores.insert("cardiac".into(), 0.6);
        }
        if lowered.contains("retina") || lowered.contains("fundus") {
            scores.insert("diabetes".into(), 0.5);
        }
        if lowered.contains("xray") || lowered.contains("ct") {
            scores.entry("cardiac".into()).or_insert(0.3);
        }
        Ok(scores)
    }
}
