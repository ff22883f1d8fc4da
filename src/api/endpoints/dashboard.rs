//! Dashboard endpoints.
//!
//! Both views run the inference path over the patient's accumulated
//! context, then project the result for their audience.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::Json;
use tracing::warn;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::dashboard::{
    build_doctor_dashboard, build_patient_dashboard, DoctorDashboard, PatientDashboard,
};
use crate::models::risk::RiskVector;
use crate::models::{PatientProfile, Recommendation};
use crate::personalization;

struct Assembled {
    profile: PatientProfile,
    risk: RiskVector,
    recommendations: Vec<Recommendation>,
    summary: Option<String>,
}

/// Run the text modality over accumulated context and rank
/// recommendations. No context yet means an empty risk vector.
async fn assemble(ctx: &ApiContext, patient_id: &str) -> Result<Assembled, ApiError> {
    let profile = ctx.core.store.load(patient_id)?;
    let context_text = personalization::accumulated_context_text(&profile);
    let weights = personalization::adapt(&profile);

    let (risk, summary) = if context_text.trim().is_empty() {
        (RiskVector::new(), None)
    } else {
        let model = ctx.core.models.text.clone();
        let input = context_text.clone();
        let scores = ctx
            .core
            .pool
            .run_degrading("text", move || {
                let entities = model.extract_entities(&input)?;
                model.predict_conditions(&entities)
            })
            .await;

        let summarizer = ctx.core.models.summarizer.clone();
        let summary = match ctx
            .core
            .pool
            .run(move || summarizer.summarize(&context_text))
            .await
        {
            Ok(text) => Some(text),
            Err(err) => {
                warn!(patient_id, error = %err, "context summary unavailable");
                None
            }
        };

        let weighted = personalization::apply_condition_weights(scores, &weights);
        (weighted, summary)
    };

    let set = ctx.core.recommender.recommend(
        &risk,
        &[],
        &profile.profile,
        &profile.thresholds,
        None,
    );

    Ok(Assembled {
        profile,
        risk,
        recommendations: set.recommendations,
        summary,
    })
}

/// `GET /api/dashboard/:patient_id/patient`
pub async fn patient_view(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
) -> Result<Json<PatientDashboard>, ApiError> {
    let assembled = assemble(&ctx, &patient_id).await?;
    Ok(Json(build_patient_dashboard(
        &assembled.profile,
        &assembled.risk,
        assembled.recommendations,
        assembled.summary,
    )))
}

/// `GET /api/dashboard/:patient_id/doctor`
pub async fn doctor_view(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
) -> Result<Json<DoctorDashboard>, ApiError> {
    let assembled = assemble(&ctx, &patient_id).await?;

    let mut modality_summaries = BTreeMap::new();
    if let Some(summary) = assembled.summary {
        modality_summaries.insert("text".to_string(), summary);
    }

    Ok(Json(build_doctor_dashboard(
        &patient_id,
        &assembled.risk,
        modality_summaries,
        assembled.recommendations,
    )))
}
