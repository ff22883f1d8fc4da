//! Preventive recommendation engine: deterministic rule firings, merged
//! by code, ranked by a composite score, and truncated to a caller bound.
//!
//! Stateless per call. The ML-scoring hook is a documented extension
//! point that defaults to zero, so ranking is driven by rule severity
//! until a real scorer is plugged in.

pub mod rules;

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::models::{Recommendation, RiskVector, Severity, Thresholds};

pub use rules::{severity_for, RuleContext};

/// Optional external scoring hook blended into the composite rank.
pub trait MlScorer: Send + Sync {
    fn score(&self, rec: &Recommendation) -> f64;
}

/// Default hook: contributes nothing to the composite score.
pub struct NoopScorer;

impl MlScorer for NoopScorer {
    fn score(&self, _rec: &Recommendation) -> f64 {
        0.0
    }
}

/// Request-level metadata returned alongside the ranked list.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationMetadata {
    pub generated_at: String,
    /// Raw rule firings before dedup.
    pub rule_firings: usize,
    /// Distinct codes after merging.
    pub distinct_codes: usize,
    pub truncated: bool,
}

#[derive(Debug, Serialize)]
pub struct RecommendationSet {
    pub recommendations: Vec<Recommendation>,
    pub metadata: RecommendationMetadata,
}

/// Result of explaining a single code. The rule set is recomputed without
/// the original symptom list, so symptom-derived reasons are absent from
/// explanations.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Explanation {
    Explained {
        code: String,
        title: String,
        reasons: Vec<String>,
        severity: Severity,
    },
    NotProduced {
        code: String,
    },
}

pub struct RecommendationEngine {
    /// Blend weight for the ML hook in the composite score.
    alpha: f64,
    default_max: usize,
    scorer: Box<dyn MlScorer>,
}

impl RecommendationEngine {
    pub fn new(alpha: f64, default_max: usize) -> Self {
        Self {
            alpha,
            default_max,
            scorer: Box::new(NoopScorer),
        }
    }

    pub fn with_scorer(alpha: f64, default_max: usize, scorer: Box<dyn MlScorer>) -> Self {
        Self {
            alpha,
            default_max,
            scorer,
        }
    }

    /// Rank recommendations for one fused risk vector.
    ///
    /// Never fails for a structurally valid risk vector: malformed profile
    /// fields skip individual rules inside the rule pass.
    pub fn recommend(
        &self,
        risk: &RiskVector,
        symptoms: &[String],
        profile: &BTreeMap<String, Value>,
        thresholds: &Thresholds,
        max_recs: Option<usize>,
    ) -> RecommendationSet {
        let firings = rules::evaluate(&RuleContext {
            risk,
            symptoms,
            profile,
            thresholds,
        });
        let rule_firings = firings.len();

        let merged = dedup_by_code(firings);
        let distinct_codes = merged.len();

        // Composite rank: base(severity)*(1-a) + ml_score*a, stable sort so
        // ties keep rule evaluation order.
        let mut scored: Vec<(f64, Recommendation)> = merged
            .into_iter()
            .map(|r| (self.composite(&r), r))
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut ranked: Vec<Recommendation> =
            scored.into_iter().map(|(_, r)| r).collect();

        let bound = max_recs.unwrap_or(self.default_max);
        let truncated = ranked.len() > bound;
        ranked.truncate(bound);

        tracing::debug!(
            rule_firings,
            distinct_codes,
            returned = ranked.len(),
            "Recommendations ranked"
        );

        RecommendationSet {
            recommendations: ranked,
            metadata: RecommendationMetadata {
                generated_at: chrono::Utc::now().to_rfc3339(),
                rule_firings,
                distinct_codes,
                truncated,
            },
        }
    }

    /// Recompute the rule set and return the justification for one code.
    /// Runs without symptoms, so symptom-derived reasons are not included.
    pub fn explain(
        &self,
        code: &str,
        risk: &RiskVector,
        profile: &BTreeMap<String, Value>,
        thresholds: &Thresholds,
    ) -> Explanation {
        let firings = rules::evaluate(&RuleContext {
            risk,
            symptoms: &[],
            profile,
            thresholds,
        });
        dedup_by_code(firings)
            .into_iter()
            .find(|r| r.code == code)
            .map(|r| Explanation::Explained {
                code: r.code,
                title: r.title,
                reasons: r.reasons,
                severity: r.severity,
            })
            .unwrap_or_else(|| Explanation::NotProduced {
                code: code.to_string(),
            })
    }

    fn composite(&self, rec: &Recommendation) -> f64 {
        rec.severity.base_score() * (1.0 - self.alpha) + self.scorer.score(rec) * self.alpha
    }
}

/// Merge firings sharing a code: union reasons/categories, max severity,
/// first-firing position kept so ranking ties stay deterministic.
fn dedup_by_code(firings: Vec<Recommendation>) -> Vec<Recommendation> {
    let mut merged: Vec<Recommendation> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for firing in firings {
        match index.get(&firing.code) {
            Some(&i) => merged[i].absorb(firing),
            None => {
                index.insert(firing.code.clone(), merged.len());
                merged.push(firing);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn engine() -> RecommendationEngine {
        RecommendationEngine::new(0.4, 6)
    }

    fn codes(set: &RecommendationSet) -> Vec<&str> {
        set.recommendations.iter().map(|r| r.code.as_str()).collect()
    }

    /// Worked scenario: high diabetes, everything else below the low band.
    #[test]
    fn high_diabetes_scenario() {
        let risk = RiskVector::from([
            ("diabetes".to_string(), 0.8),
            ("hypertension".to_string(), 0.1),
            ("cardiac".to_string(), 0.05),
        ]);
        let set = engine().recommend(
            &risk,
            &[],
            &BTreeMap::new(),
            &Thresholds::default(),
            None,
        );

        let codes = codes(&set);
        assert!(codes.contains(&"R_DIAB_1"));
        assert!(codes.contains(&"R_DIAB_2"));
        assert!(!codes.iter().any(|c| c.starts_with("R_HTN")));
        assert!(!codes.iter().any(|c| c.starts_with("R_CARD")));
        for rec in &set.recommendations {
            assert_eq!(rec.severity, Severity::High);
        }
    }

    /// Worked scenario: profile-only rules, obese + screening age.
    #[test]
    fn profile_only_scenario() {
        let profile = BTreeMap::from([
            ("bmi".to_string(), json!(32)),
            ("age".to_string(), json!(55)),
        ]);
        let set = engine().recommend(
            &RiskVector::new(),
            &[],
            &profile,
            &Thresholds::default(),
            None,
        );

        let codes = codes(&set);
        assert!(codes.contains(&"R_BMI_1"));
        assert!(codes.contains(&"R_SCREEN_1"));
        assert!(!codes.contains(&"R_BMI_2"));
    }

    #[test]
    fn same_code_firings_merge_into_one() {
        let risk = RiskVector::from([("diabetes".to_string(), 0.8)]);
        let symptoms = vec!["frequent thirst".to_string()];
        let set = engine().recommend(
            &risk,
            &symptoms,
            &BTreeMap::new(),
            &Thresholds::default(),
            None,
        );

        let diab: Vec<_> = set
            .recommendations
            .iter()
            .filter(|r| r.code == "R_DIAB_1")
            .collect();
        assert_eq!(diab.len(), 1);
        assert!(diab[0].reasons.len() >= 2);
        assert_eq!(diab[0].severity, Severity::High);
        assert!(set.metadata.rule_firings > set.metadata.distinct_codes);
    }

    #[test]
    fn ranking_is_deterministic_across_calls() {
        let risk = RiskVector::from([
            ("diabetes".to_string(), 0.6),
            ("hypertension".to_string(), 0.6),
            ("cardiac".to_string(), 0.6),
        ]);
        let profile = BTreeMap::from([
            ("bmi".to_string(), json!(31)),
            ("age".to_string(), json!(66)),
        ]);
        let eng = engine();
        let first_set = eng.recommend(&risk, &[], &profile, &Thresholds::default(), None);
        let first = codes(&first_set);
        for _ in 0..5 {
            let repeat_set = eng.recommend(&risk, &[], &profile, &Thresholds::default(), None);
            let repeat = codes(&repeat_set);
            assert_eq!(first, repeat);
        }
    }

    #[test]
    fn severity_tracks_patient_thresholds() {
        let risk = RiskVector::from([("diabetes".to_string(), 0.5)]);
        let strict = Thresholds {
            low: 0.05,
            medium: 0.1,
            high: 0.9,
        };
        let set = engine().recommend(&risk, &[], &BTreeMap::new(), &strict, None);
        let diab = set
            .recommendations
            .iter()
            .find(|r| r.code == "R_DIAB_1")
            .unwrap();
        assert_eq!(diab.severity, Severity::Medium);
    }

    #[test]
    fn truncation_respects_max_recs() {
        let risk = RiskVector::from([
            ("diabetes".to_string(), 0.8),
            ("hypertension".to_string(), 0.8),
            ("cardiac".to_string(), 0.8),
        ]);
        let set = engine().recommend(
            &risk,
            &[],
            &BTreeMap::new(),
            &Thresholds::default(),
            Some(1),
        );
        assert_eq!(set.recommendations.len(), 1);
        assert!(set.metadata.truncated);
    }

    #[test]
    fn ml_scorer_hook_can_reorder() {
        struct ScreenBooster;
        impl MlScorer for ScreenBooster {
            fn score(&self, rec: &Recommendation) -> f64 {
                if rec.code == "R_SCREEN_1" {
                    1.0
                } else {
                    0.0
                }
            }
        }

        let risk = RiskVector::from([("diabetes".to_string(), 0.8)]);
        let profile = BTreeMap::from([("age".to_string(), json!(70))]);

        // With a heavy blend the boosted low-severity rec outranks High.
        let eng = RecommendationEngine::with_scorer(0.9, 6, Box::new(ScreenBooster));
        let set = eng.recommend(&risk, &[], &profile, &Thresholds::default(), None);
        assert_eq!(set.recommendations[0].code, "R_SCREEN_1");

        // Default noop hook keeps severity ordering.
        let set = engine().recommend(&risk, &[], &profile, &Thresholds::default(), None);
        assert_ne!(set.recommendations[0].code, "R_SCREEN_1");
    }

    #[test]
    fn explain_returns_justification_without_symptoms() {
        let risk = RiskVector::from([("diabetes".to_string(), 0.8)]);
        let explanation =
            engine().explain("R_DIAB_1", &risk, &BTreeMap::new(), &Thresholds::default());
        match explanation {
            Explanation::Explained {
                code,
                severity,
                reasons,
                ..
            } => {
                assert_eq!(code, "R_DIAB_1");
                assert_eq!(severity, Severity::High);
                assert!(!reasons.is_empty());
            }
            other => panic!("Expected Explained, got {other:?}"),
        }
    }

    #[test]
    fn explain_unknown_code_is_not_produced() {
        let explanation = engine().explain(
            "R_NOPE_9",
            &RiskVector::new(),
            &BTreeMap::new(),
            &Thresholds::default(),
        );
        assert!(matches!(explanation, Explanation::NotProduced { .. }));
    }

    #[test]
    fn empty_inputs_yield_empty_set() {
        let set = engine().recommend(
            &RiskVector::new(),
            &[],
            &BTreeMap::new(),
            &Thresholds::default(),
            None,
        );
        assert!(set.recommendations.is_empty());
        assert!(!set.metadata.truncated);
    }
}
