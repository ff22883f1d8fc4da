//! Personalization settings endpoints.
//!
//! Reads fail open (a missing or corrupted settings file yields the
//! defaults); writes validate and fail hard.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::PatientProfile;
use crate::store::{ContextKind, ThresholdUpdate};

#[derive(Deserialize)]
pub struct UpdateRequest<T> {
    pub values: T,
    pub author: String,
}

#[derive(Deserialize)]
pub struct ContextRequest {
    pub kind: ContextKind,
    pub snapshot: Value,
}

#[derive(Serialize)]
pub struct UpdateResponse {
    pub status: &'static str,
    pub profile: PatientProfile,
}

fn require_author(author: &str) -> Result<(), ApiError> {
    if author.trim().is_empty() {
        return Err(ApiError::BadRequest("author is required".into()));
    }
    Ok(())
}

/// `GET /api/personalization/:patient_id`
pub async fn get(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
) -> Result<Json<PatientProfile>, ApiError> {
    let profile = ctx.core.store.load(&patient_id)?;
    Ok(Json(profile))
}

/// `PUT /api/personalization/:patient_id/weights`
pub async fn put_weights(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
    Json(request): Json<UpdateRequest<BTreeMap<String, f64>>>,
) -> Result<Json<UpdateResponse>, ApiError> {
    require_author(&request.author)?;
    ctx.core
        .store
        .update_weights(&patient_id, &request.values, &request.author)?;
    respond(&ctx, &patient_id)
}

/// `PUT /api/personalization/:patient_id/thresholds`
pub async fn put_thresholds(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
    Json(request): Json<UpdateRequest<ThresholdUpdate>>,
) -> Result<Json<UpdateResponse>, ApiError> {
    require_author(&request.author)?;
    ctx.core
        .store
        .update_thresholds(&patient_id, request.values, &request.author)?;
    respond(&ctx, &patient_id)
}

/// `PUT /api/personalization/:patient_id/profile`
pub async fn put_profile(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
    Json(request): Json<UpdateRequest<BTreeMap<String, Value>>>,
) -> Result<Json<UpdateResponse>, ApiError> {
    require_author(&request.author)?;
    ctx.core
        .store
        .update_profile(&patient_id, &request.values, &request.author)?;
    respond(&ctx, &patient_id)
}

/// `POST /api/personalization/:patient_id/context`
pub async fn post_context(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
    Json(request): Json<ContextRequest>,
) -> Result<Json<UpdateResponse>, ApiError> {
    ctx.core
        .store
        .append_context(&patient_id, request.kind, request.snapshot)?;
    respond(&ctx, &patient_id)
}

fn respond(ctx: &ApiContext, patient_id: &str) -> Result<Json<UpdateResponse>, ApiError> {
    let profile = ctx.core.store.load(patient_id)?;
    Ok(Json(UpdateResponse {
        status: "ok",
        profile,
    }))
}
