//! Multi-modal risk prediction endpoint.
//!
//! `POST /api/predict-risk` fans out to the tabular, text and image
//! models concurrently. A failed or timed-out modality degrades to an
//! empty contribution; the fusion step treats it as zero risk.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::fusion;
use crate::models::risk::{round4, top_k, RankedRisk, RiskVector};
use crate::models::Entity;
use crate::personalization;
use crate::recommend::{Explanation, RecommendationSet};
use crate::store::ContextKind;
use crate::text;

#[derive(Deserialize)]
pub struct PredictRequest {
    pub patient_id: String,
    pub features: Option<BTreeMap<String, f64>>,
    pub symptom_text: Option<String>,
    pub image_uri: Option<String>,
    pub weights: Option<BTreeMap<String, f64>>,
    pub top_k: Option<usize>,
    #[serde(default)]
    pub include_recommendations: bool,
    pub max_recs: Option<usize>,
}

#[derive(Serialize)]
pub struct PredictResponse {
    pub patient_id: String,
    pub risk_scores: RiskVector,
    pub predictions: Vec<RankedRisk>,
    pub weights_used: BTreeMap<String, f64>,
    pub entities: Vec<Entity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<RecommendationSet>,
}

/// `POST /api/predict-risk`
pub async fn risk(
    State(ctx): State<ApiContext>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    if request.features.is_none()
        && request.symptom_text.is_none()
        && request.image_uri.is_none()
    {
        return Err(ApiError::BadRequest(
            "at least one of features, symptom_text or image_uri is required".into(),
        ));
    }

    let profile = ctx.core.store.load(&request.patient_id)?;
    let weights = personalization::resolve(
        personalization::adapt(&profile),
        request.weights.as_ref(),
    );

    let tabular_scores = tabular_modality(&ctx, request.features.clone());
    let text_results = text_modality(&ctx, request.symptom_text.as_deref());
    let image_scores = image_modality(&ctx, request.image_uri.clone());
    let (tabular_scores, (entities, text_scores), image_scores) =
        tokio::join!(tabular_scores, text_results, image_scores);

    let fused = fusion::combine(&tabular_scores, &text_scores, &image_scores, &weights);
    let fused = personalization::apply_condition_weights(fused, &weights);

    let k = request.top_k.unwrap_or(ctx.core.settings.prediction_top_k);
    let predictions = top_k(&fused, k);

    let recommendations = if request.include_recommendations {
        let symptoms: Vec<String> = entities.iter().map(|e| e.entity.clone()).collect();
        Some(ctx.core.recommender.recommend(
            &fused,
            &symptoms,
            &profile.profile,
            &profile.thresholds,
            request.max_recs,
        ))
    } else {
        None
    };

    let rounded: RiskVector = fused
        .iter()
        .map(|(condition, p)| (condition.clone(), round4(*p)))
        .collect();

    let snapshot = json!({
        "kind": "risk_prediction",
        "risk_scores": rounded,
        "weights_used": weights,
    });
    if let Err(err) = ctx
        .core
        .store
        .append_context(&request.patient_id, ContextKind::History, snapshot)
    {
        warn!(patient_id = %request.patient_id, error = %err, "context append failed");
    }

    Ok(Json(PredictResponse {
        patient_id: request.patient_id,
        risk_scores: rounded,
        predictions,
        weights_used: weights,
        entities,
        recommendations,
    }))
}

async fn tabular_modality(
    ctx: &ApiContext,
    features: Option<BTreeMap<String, f64>>,
) -> RiskVector {
    let Some(features) = features else {
        return RiskVector::new();
    };
    let model = ctx.core.models.tabular.clone();
    ctx.core
        .pool
        .run_degrading("tabular", move || model.predict_proba(&features))
        .await
}

async fn text_modality(
    ctx: &ApiContext,
    symptom_text: Option<&str>,
) -> (Vec<Entity>, RiskVector) {
    let Some(raw) = symptom_text else {
        return (Vec::new(), RiskVector::new());
    };
    let processed = text::preprocess_pipeline(raw);
    let model = ctx.core.models.text.clone();
    let result = ctx
        .core
        .pool
        .run(move || {
            let entities = model.extract_entities(&processed)?;
            let scores = model.predict_conditions(&entities)?;
            Ok((entities, scores))
        })
        .await;
    match result {
        Ok(pair) => pair,
        Err(err) => {
            warn!(modality = "text", error = %err, "modality degraded to empty result");
            (Vec::new(), RiskVector::new())
        }
    }
}

async fn image_modality(ctx: &ApiContext, image_uri: Option<String>) -> RiskVector {
    let Some(uri) = image_uri else {
        return RiskVector::new();
    };
    let model = ctx.core.models.image.clone();
    ctx.core
        .pool
        .run_degrading("image", move || model.predict_image(&uri))
        .await
}

// ── Explain ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ExplainRequest {
    pub patient_id: String,
    pub code: String,
    #[serde(default)]
    pub risk_scores: RiskVector,
}

/// `POST /api/recommendations/explain` — why a recommendation code
/// would (or would not) fire for the given risk vector.
pub async fn explain(
    State(ctx): State<ApiContext>,
    Json(request): Json<ExplainRequest>,
) -> Result<Json<Explanation>, ApiError> {
    let profile = ctx.core.store.load(&request.patient_id)?;
    let explanation = ctx.core.recommender.explain(
        &request.code,
        &request.risk_scores,
        &profile.profile,
        &profile.thresholds,
    );
    Ok(Json(explanation))
}
