//! Model adapters.
//!
//! Every model behind the API is reached through one of the blocking
//! traits below. The [`AdapterPool`] owns the concurrency limit and
//! runs each call on the blocking thread pool under a deadline, so a
//! slow or wedged model degrades a single modality instead of stalling
//! the whole request.

pub mod lexicon;
pub mod remote;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::config::{ModelBackend, Settings};
use crate::models::risk::RiskVector;
use crate::models::Entity;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("model request failed: {0}")]
    Http(String),
    #[error("model call exceeded deadline of {0:?}")]
    Timeout(Duration),
    #[error("model returned malformed payload: {0}")]
    Malformed(String),
    #[error("adapter pool is shut down")]
    PoolClosed,
    #[error("model task panicked or was cancelled")]
    Join,
}

// ── Model traits ────────────────────────────────────────────────────

/// Structured-feature classifier (labs, vitals, demographics).
pub trait TabularModel: Send + Sync {
    fn predict_proba(&self, features: &BTreeMap<String, f64>) -> Result<RiskVector, AdapterError>;
}

/// Clinical-text entity extraction and condition scoring.
pub trait TextModel: Send + Sync {
    fn extract_entities(&self, text: &str) -> Result<Vec<Entity>, AdapterError>;
    fn predict_conditions(&self, entities: &[Entity]) -> Result<RiskVector, AdapterError>;
}

/// Report summarization.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, text: &str) -> Result<String, AdapterError>;
}

/// Imaging classifier, addressed by a caller-supplied image reference.
pub trait ImageModel: Send + Sync {
    fn predict_image(&self, image_ref: &str) -> Result<RiskVector, AdapterError>;
}

// ── Pool ────────────────────────────────────────────────────────────

/// Bounded executor for blocking model calls.
#[derive(Clone)]
pub struct AdapterPool {
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl AdapterPool {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.max_concurrent_inferences, settings.adapter_timeout)
    }

    /// Run one blocking model call under a permit and the pool deadline.
    pub async fn run<T, F>(&self, f: F) -> Result<T, AdapterError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, AdapterError> + Send + 'static,
    {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AdapterError::PoolClosed)?;

        let task = tokio::task::spawn_blocking(f);
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(_join)) => Err(AdapterError::Join),
            Err(_elapsed) => Err(AdapterError::Timeout(self.timeout)),
        }
    }

    /// Like [`run`](Self::run), but a failed or timed-out modality
    /// degrades to an empty risk vector instead of failing the request.
    pub async fn run_degrading<F>(&self, modality: &'static str, f: F) -> RiskVector
    where
        F: FnOnce() -> Result<RiskVector, AdapterError> + Send + 'static,
    {
        match self.run(f).await {
            Ok(scores) => scores,
            Err(err) => {
                warn!(modality, error = %err, "modality degraded to empty result");
                RiskVector::new()
            }
        }
    }
}

// ── Model set ───────────────────────────────────────────────────────

/// The four model handles the API serves from, selected once at startup.
#[derive(Clone)]
pub struct ModelSet {
    pub tabular: Arc<dyn TabularModel>,
    pub text: Arc<dyn TextModel>,
    pub summarizer: Arc<dyn Summarizer>,
    pub image: Arc<dyn ImageModel>,
}

impl ModelSet {
    /// Deterministic in-process backend. Always available, no network.
    pub fn lexicon() -> Self {
        let model = Arc::new(lexicon::LexiconModel::new());
        Self {
            tabular: model.clone(),
            text: model.clone(),
            summarizer: model.clone(),
            image: model,
        }
    }

    /// HTTP backend serving all four model roles.
    pub fn remote(base_url: &str) -> Self {
        let model = Arc::new(remote::RemoteModel::new(base_url));
        Self {
            tabular: model.clone(),
            text: model.clone(),
            summarizer: model.clone(),
            image: model,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        match settings.model_backend {
            ModelBackend::Lexicon => Self::lexicon(),
            ModelBackend::Remote => Self::remote(&settings.model_url),
        }
    }
}
