//! Symptom analysis endpoint.
//!
//! `POST /api/analyze-symptoms` runs the clinical-text model over a
//! free-text symptom note: preprocess, extract entities, score
//! conditions, then apply the patient's personalization weights.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::risk::{top_k, RankedRisk};
use crate::models::Entity;
use crate::personalization;
use crate::store::ContextKind;
use crate::text;

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    pub patient_id: String,
    pub symptom_text: String,
    pub top_k: Option<usize>,
}

#[derive(Serialize)]
pub struct AnalyzeResponse {
    pub patient_id: String,
    pub processed_text: String,
    pub entities: Vec<Entity>,
    pub predictions: Vec<RankedRisk>,
}

/// `POST /api/analyze-symptoms`
pub async fn symptoms(
    State(ctx): State<ApiContext>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    if request.symptom_text.trim().is_empty() {
        return Err(ApiError::BadRequest("symptom_text is required".into()));
    }

    let processed = text::preprocess_pipeline(&request.symptom_text);

    let model = ctx.core.models.text.clone();
    let input = processed.clone();
    let (entities, raw_scores) = ctx
        .core
        .pool
        .run(move || {
            let entities = model.extract_entities(&input)?;
            let scores = model.predict_conditions(&entities)?;
            Ok((entities, scores))
        })
        .await?;

    let adapter = personalization::WeightAdapter::new(ctx.core.store.clone());
    let weights = adapter.effective_weights(&request.patient_id)?;
    let weighted = personalization::apply_condition_weights(raw_scores, &weights);

    let k = request.top_k.unwrap_or(ctx.core.settings.prediction_top_k);
    let predictions = top_k(&weighted, k);

    // Context append is a side effect of a successful analysis; failing
    // it must not fail the response.
    let snapshot = json!({
        "kind": "symptom_analysis",
        "text": processed,
        "predictions": predictions,
    });
    if let Err(err) = ctx
        .core
        .store
        .append_context(&request.patient_id, ContextKind::History, snapshot)
    {
        warn!(patient_id = %request.patient_id, error = %err, "context append failed");
    }

    Ok(Json(AnalyzeResponse {
        patient_id: request.patient_id,
        processed_text: processed,
        entities,
        predictions,
    }))
}
