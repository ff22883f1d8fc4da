//! API router.
//!
//! Returns a composable `Router` with all routes nested under `/api`,
//! wrapped in a trace layer and permissive CORS.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn api_router(core: Arc<CoreState>) -> Router {
    let ctx = ApiContext::new(core);

    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/analyze-symptoms", post(endpoints::analyze::symptoms))
        .route("/summarize-report", post(endpoints::summarize::report))
        .route("/predict-risk", post(endpoints::predict::risk))
        .route(
            "/recommendations/explain",
            post(endpoints::predict::explain),
        )
        .route(
            "/personalization/:patient_id",
            get(endpoints::personalization::get),
        )
        .route(
            "/personalization/:patient_id/weights",
            put(endpoints::personalization::put_weights),
        )
        .route(
            "/personalization/:patient_id/thresholds",
            put(endpoints::personalization::put_thresholds),
        )
        .route(
            "/personalization/:patient_id/profile",
            put(endpoints::personalization::put_profile),
        )
        .route(
            "/personalization/:patient_id/context",
            post(endpoints::personalization::post_context),
        )
        .route(
            "/dashboard/:patient_id/patient",
            get(endpoints::dashboard::patient_view),
        )
        .route(
            "/dashboard/:patient_id/doctor",
            get(endpoints::dashboard::doctor_view),
        )
        .with_state(ctx);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
