//! Transport-agnostic application state.
//!
//! `CoreState` is the single shared state behind the REST API. Built
//! once at startup from [`Settings`], then wrapped in `Arc` and handed
//! to the router.

use std::sync::Arc;

use tracing::info;

use crate::adapters::{AdapterPool, ModelSet};
use crate::config::Settings;
use crate::recommend::RecommendationEngine;
use crate::store::PatientSettingsStore;

pub struct CoreState {
    pub settings: Settings,
    pub store: Arc<PatientSettingsStore>,
    pub models: ModelSet,
    pub pool: AdapterPool,
    pub recommender: RecommendationEngine,
}

impl CoreState {
    pub fn new(settings: Settings) -> Self {
        info!(
            data_dir = %settings.data_dir.display(),
            backend = ?settings.model_backend,
            "initializing core state"
        );

        let store = Arc::new(PatientSettingsStore::new(settings.patients_dir()));
        let models = ModelSet::from_settings(&settings);
        let pool = AdapterPool::from_settings(&settings);
        let recommender = RecommendationEngine::new(
            settings.score_blend_alpha,
            settings.max_recommendations,
        );

        Self {
            settings,
            store,
            models,
            pool,
            recommender,
        }
    }
}
