//! Deterministic clinical rule set.
//!
//! Each rule fires zero or one recommendation. Severity always comes from
//! comparing the triggering score against the patient's own thresholds,
//! never from hardcoded cutoffs. Rule evaluation order is fixed
//! (condition rules in lexical condition order, then symptom rules, then
//! profile rules) so dedup insertion order, and therefore tie breaking,
//! is reproducible.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::models::profile::numeric_field;
use crate::models::{Recommendation, RiskVector, Severity, Thresholds};

/// Age above which a medium-or-worse hypertension score warrants an
/// in-person review on top of home monitoring.
const HTN_REVIEW_AGE: f64 = 60.0;
/// Routine screening age cutoff.
const SCREENING_AGE: f64 = 50.0;
/// BMI bands: obese >= 30, overweight [25, 30).
const BMI_OBESE: f64 = 30.0;
const BMI_OVERWEIGHT: f64 = 25.0;

/// Everything a rule may read. Rules never mutate state.
pub struct RuleContext<'a> {
    pub risk: &'a RiskVector,
    pub symptoms: &'a [String],
    pub profile: &'a BTreeMap<String, Value>,
    pub thresholds: &'a Thresholds,
}

/// Band a score using the patient-specific thresholds.
pub fn severity_for(score: f64, thresholds: &Thresholds) -> Severity {
    if score >= thresholds.high {
        Severity::High
    } else if score >= thresholds.medium {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Symptom keywords that reinforce a condition-specific recommendation.
/// A match re-fires the condition's primary code with a symptom reason,
/// which the dedup pass then merges.
const SYMPTOM_RULES: &[(&[&str], &str)] = &[
    (&["thirst", "urination", "sugar"], "diabetes"),
    (&["headache", "dizziness", "nosebleed"], "hypertension"),
    (&["chest pain", "palpitations", "shortness of breath"], "cardiac"),
];

/// Run every rule and return the raw firings in evaluation order.
/// Deduplication and ranking happen in the engine.
pub fn evaluate(ctx: &RuleContext<'_>) -> Vec<Recommendation> {
    let mut firings = Vec::new();

    // Condition rules: only conditions at or above the patient's low band.
    for (condition, score) in ctx.risk {
        if *score < ctx.thresholds.low {
            continue;
        }
        let severity = severity_for(*score, ctx.thresholds);
        let reason = format!(
            "{condition} risk score {:.2} is in the {} band",
            score,
            severity.as_str()
        );
        match condition.as_str() {
            "diabetes" => {
                firings.push(rec(
                    "R_DIAB_1",
                    "Glucose follow-up",
                    "Schedule a fasting glucose and HbA1c check.",
                    severity,
                    &reason,
                    &["screening", "diet"],
                ));
                if severity >= Severity::Medium {
                    firings.push(rec(
                        "R_DIAB_2",
                        "Clinician review of glycemic control",
                        "Discuss the elevated diabetes risk with your clinician.",
                        severity,
                        &reason,
                        &["screening", "urgent"],
                    ));
                }
            }
            "hypertension" => {
                firings.push(rec(
                    "R_HTN_1",
                    "Blood pressure monitoring",
                    "Track blood pressure at home and reduce salt intake.",
                    severity,
                    &reason,
                    &["monitoring", "diet"],
                ));
                if severity >= Severity::Medium {
                    if let Some(age) = checked_numeric(ctx.profile, "age") {
                        if age > HTN_REVIEW_AGE {
                            firings.push(rec(
                                "R_HTN_2",
                                "In-person blood pressure review",
                                "Book an in-person blood pressure review given age and risk.",
                                severity,
                                &format!("{reason}; patient is over {HTN_REVIEW_AGE:.0}"),
                                &["screening"],
                            ));
                        }
                    }
                }
            }
            "cardiac" => {
                firings.push(rec(
                    "R_CARD_1",
                    "Cardiology referral",
                    "Arrange a cardiology assessment.",
                    severity,
                    &reason,
                    &["screening"],
                ));
            }
            _ => {
                // Conditions without a dedicated rule still surface generically.
                firings.push(rec(
                    &format!("R_GEN_{}", condition.to_uppercase()),
                    &format!("Follow up on {condition}"),
                    "Discuss this elevated risk with your clinician.",
                    severity,
                    &reason,
                    &["screening"],
                ));
            }
        }
    }

    // Symptom rules: reinforce condition codes with reported symptoms.
    for symptom in ctx.symptoms {
        let lowered = symptom.to_lowercase();
        for (keywords, condition) in SYMPTOM_RULES {
            if keywords.iter().any(|kw| lowered.contains(kw)) {
                let severity = ctx
                    .risk
                    .get(*condition)
                    .map(|score| severity_for(*score, ctx.thresholds))
                    .unwrap_or(Severity::Low);
                firings.push(symptom_rec(condition, severity, symptom));
            }
        }
    }

    // Profile rules: risk-independent, malformed fields skip the rule.
    if let Some(bmi) = checked_numeric(ctx.profile, "bmi") {
        if bmi >= BMI_OBESE {
            firings.push(rec(
                "R_BMI_1",
                "Weight management program",
                "A structured diet and exercise program is recommended.",
                Severity::Medium,
                &format!("BMI {bmi:.1} is in the obese range (>= {BMI_OBESE:.0})"),
                &["diet", "exercise"],
            ));
        } else if bmi >= BMI_OVERWEIGHT {
            firings.push(rec(
                "R_BMI_2",
                "Lifestyle adjustments",
                "Moderate dietary changes and regular activity are recommended.",
                Severity::Low,
                &format!("BMI {bmi:.1} is in the overweight range [{BMI_OVERWEIGHT:.0}, {BMI_OBESE:.0})"),
                &["diet", "exercise"],
            ));
        }
    }
    if let Some(age) = checked_numeric(ctx.profile, "age") {
        if age >= SCREENING_AGE {
            firings.push(rec(
                "R_SCREEN_1",
                "Routine preventive screening",
                "Age-appropriate preventive screening is due.",
                Severity::Low,
                &format!("Age {age:.0} meets the {SCREENING_AGE:.0}+ screening guideline"),
                &["screening"],
            ));
        }
    }

    firings
}

/// The primary code a symptom keyword reinforces for each condition.
fn symptom_rec(condition: &str, severity: Severity, symptom: &str) -> Recommendation {
    let (code, title, text) = match condition {
        "diabetes" => (
            "R_DIAB_1",
            "Glucose follow-up",
            "Schedule a fasting glucose and HbA1c check.",
        ),
        "hypertension" => (
            "R_HTN_1",
            "Blood pressure monitoring",
            "Track blood pressure at home and reduce salt intake.",
        ),
        _ => (
            "R_CARD_1",
            "Cardiology referral",
            "Arrange a cardiology assessment.",
        ),
    };
    rec(
        code,
        title,
        text,
        severity,
        &format!("Reported symptom: \"{symptom}\""),
        &["screening"],
    )
}

/// Numeric profile read with a debug log when the field exists but is
/// malformed, so a bad value skips one rule instead of the whole request.
fn checked_numeric(profile: &BTreeMap<String, Value>, key: &str) -> Option<f64> {
    match numeric_field(profile, key) {
        Some(value) if value.is_finite() => Some(value),
        Some(_) => None,
        None => {
            if profile.contains_key(key) {
                tracing::debug!(field = key, "Malformed profile field, skipping rule");
            }
            None
        }
    }
}

fn rec(
    code: &str,
    title: &str,
    text: &str,
    severity: Severity,
    reason: &str,
    categories: &[&str],
) -> Recommendation {
    Recommendation {
        code: code.to_string(),
        title: title.to_string(),
        text: text.to_string(),
        severity,
        reasons: vec![reason.to_string()],
        categories: categories.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
    }
}
