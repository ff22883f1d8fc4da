//! Dashboard projections: pure formatting over already-computed results,
//! bucketed for two audiences. No new computation happens here.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::risk::{round4, RiskVector};
use crate::models::{AuditRecord, PatientProfile, Recommendation};

/// Doctor view escalation cutoff: any condition above this score becomes
/// an alert.
pub const DOCTOR_ALERT_THRESHOLD: f64 = 0.7;

/// One formatted risk line shared by both views.
#[derive(Debug, Clone, Serialize)]
pub struct RiskLine {
    pub condition: String,
    pub probability: f64,
}

/// Personalization metadata surfaced to the patient.
#[derive(Debug, Clone, Serialize)]
pub struct PersonalizationMeta {
    pub weight_overrides: usize,
    pub last_change: Option<AuditRecord>,
}

#[derive(Debug, Serialize)]
pub struct PatientDashboard {
    pub patient_id: String,
    pub overall_status: &'static str,
    pub risk_summary: Vec<RiskLine>,
    pub recommendations: Vec<Recommendation>,
    pub summary: Option<String>,
    pub personalization: PersonalizationMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorAlert {
    pub condition: String,
    pub score: f64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorDashboard {
    pub patient_id: String,
    pub risk_scores: Vec<RiskLine>,
    pub alerts: Vec<DoctorAlert>,
    pub modality_summaries: BTreeMap<String, String>,
    pub recommendations: Vec<Recommendation>,
}

/// Bucket from mean risk: `<0.3 Healthy`, `<0.6 Moderate Risk`, else High.
pub fn overall_status(risk: &RiskVector) -> &'static str {
    if risk.is_empty() {
        return "Healthy";
    }
    let mean = risk.values().sum::<f64>() / risk.len() as f64;
    if mean < 0.3 {
        "Healthy"
    } else if mean < 0.6 {
        "Moderate Risk"
    } else {
        "High Risk"
    }
}

fn risk_lines(risk: &RiskVector) -> Vec<RiskLine> {
    let mut lines: Vec<RiskLine> = risk
        .iter()
        .map(|(condition, p)| RiskLine {
            condition: condition.clone(),
            probability: round4(*p),
        })
        .collect();
    lines.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.condition.cmp(&b.condition))
    });
    lines
}

/// Patient-facing projection of one inference result.
pub fn build_patient_dashboard(
    profile: &PatientProfile,
    risk: &RiskVector,
    recommendations: Vec<Recommendation>,
    summary: Option<String>,
) -> PatientDashboard {
    PatientDashboard {
        patient_id: profile.patient_id.clone(),
        overall_status: overall_status(risk),
        risk_summary: risk_lines(risk),
        recommendations,
        summary,
        personalization: PersonalizationMeta {
            weight_overrides: profile.weights.len(),
            last_change: profile.audit_trail.last().cloned(),
        },
    }
}

/// Doctor-facing projection: full vector, auto-generated escalation
/// alerts, and caller-supplied free-text modality summaries.
pub fn build_doctor_dashboard(
    patient_id: &str,
    risk: &RiskVector,
    modality_summaries: BTreeMap<String, String>,
    recommendations: Vec<Recommendation>,
) -> DoctorDashboard {
    let alerts = risk
        .iter()
        .filter(|(_, score)| **score > DOCTOR_ALERT_THRESHOLD)
        .map(|(condition, score)| DoctorAlert {
            condition: condition.clone(),
            score: round4(*score),
            message: format!(
                "{condition} risk {:.2} exceeds the escalation threshold {DOCTOR_ALERT_THRESHOLD}",
                score
            ),
        })
        .collect();

    DoctorDashboard {
        patient_id: patient_id.to_string(),
        risk_scores: risk_lines(risk),
        alerts,
        modality_summaries,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn risk(entries: &[(&str, f64)]) -> RiskVector {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn status_buckets_by_mean_risk() {
        assert_eq!(overall_status(&risk(&[("a", 0.1), ("b", 0.2)])), "Healthy");
        assert_eq!(
            overall_status(&risk(&[("a", 0.4), ("b", 0.5)])),
            "Moderate Risk"
        );
        assert_eq!(overall_status(&risk(&[("a", 0.9), ("b", 0.7)])), "High Risk");
    }

    #[test]
    fn empty_vector_reads_healthy() {
        assert_eq!(overall_status(&RiskVector::new()), "Healthy");
    }

    #[test]
    fn bucket_boundaries_are_half_open() {
        assert_eq!(overall_status(&risk(&[("a", 0.3)])), "Moderate Risk");
        assert_eq!(overall_status(&risk(&[("a", 0.6)])), "High Risk");
    }

    #[test]
    fn patient_dashboard_carries_personalization_meta() {
        let mut profile = PatientProfile::with_defaults("p-dash");
        profile.audit_trail.push(AuditRecord {
            timestamp: "2026-08-29T12:00:00Z".into(),
            author: "dr-a".into(),
            change_summary: "weights(1)".into(),
        });

        let dash = build_patient_dashboard(
            &profile,
            &risk(&[("diabetes", 0.42)]),
            Vec::new(),
            Some("Stable labs.".into()),
        );
        assert_eq!(dash.overall_status, "Moderate Risk");
        assert_eq!(dash.personalization.weight_overrides, 3);
        assert_eq!(
            dash.personalization.last_change.as_ref().unwrap().author,
            "dr-a"
        );
        assert_eq!(dash.summary.as_deref(), Some("Stable labs."));
    }

    #[test]
    fn doctor_alerts_fire_above_escalation_threshold() {
        let dash = build_doctor_dashboard(
            "p-doc",
            &risk(&[("diabetes", 0.85), ("flu", 0.7), ("cardiac", 0.2)]),
            BTreeMap::new(),
            Vec::new(),
        );
        // 0.7 is not strictly above the cutoff
        assert_eq!(dash.alerts.len(), 1);
        assert_eq!(dash.alerts[0].condition, "diabetes");
        assert!(dash.alerts[0].message.contains("escalation"));
    }

    #[test]
    fn risk_lines_sorted_descending() {
        let dash = build_doctor_dashboard(
            "p-sort",
            &risk(&[("a", 0.2), ("b", 0.9), ("c", 0.5)]),
            BTreeMap::new(),
            Vec::new(),
        );
        let conditions: Vec<&str> = dash
            .risk_scores
            .iter()
            .map(|l| l.condition.as_str())
            .collect();
        assert_eq!(conditions, vec!["b", "c", "a"]);
    }
}
