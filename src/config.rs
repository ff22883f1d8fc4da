//! Runtime configuration: data directories, server binding, model backend
//! selection, and tuning knobs. Everything is overridable via `MEDFUSE_*`
//! environment variables with sensible defaults.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Medfuse";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing directive when `RUST_LOG` is unset.
pub fn default_log_filter() -> String {
    "medfuse=debug,tower_http=info,info".to_string()
}

/// Which model backend serves the four modality adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelBackend {
    /// Deterministic keyword/feature scoring, runs in-process.
    Lexicon,
    /// Remote inference service reached over HTTP.
    Remote,
}

/// Resolved runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root for per-patient personalization namespaces.
    pub data_dir: PathBuf,
    /// HTTP listen address.
    pub bind_addr: SocketAddr,
    /// Model backend selected at construction time, never inferred at runtime.
    pub model_backend: ModelBackend,
    /// Base URL of the remote inference service (Remote backend only).
    pub model_url: String,
    /// Bounded worker pool size for blocking model-adapter calls.
    pub max_concurrent_inferences: usize,
    /// Per-adapter-call timeout; a timed-out modality degrades to zero.
    pub adapter_timeout: Duration,
    /// Default number of predictions returned by analyze/predict routes.
    pub prediction_top_k: usize,
    /// Maximum formatted summary length in characters.
    pub summary_max_chars: usize,
    /// Default recommendation list bound.
    pub max_recommendations: usize,
    /// Blend weight between rule severity and the ML-scoring hook.
    pub score_blend_alpha: f64,
}

impl Settings {
    /// Read settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            data_dir: env_path("MEDFUSE_DATA_DIR").unwrap_or_else(default_data_dir),
            bind_addr: env_parse("MEDFUSE_BIND")
                .unwrap_or_else(|| "127.0.0.1:8750".parse().expect("static addr")),
            model_backend: match std::env::var("MEDFUSE_MODEL_BACKEND").as_deref() {
                Ok("remote") => ModelBackend::Remote,
                _ => ModelBackend::Lexicon,
            },
            model_url: std::env::var("MEDFUSE_MODEL_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:11500".to_string()),
            max_concurrent_inferences: env_parse("MEDFUSE_MAX_INFERENCES").unwrap_or(4),
            adapter_timeout: Duration::from_secs(
                env_parse("MEDFUSE_ADAPTER_TIMEOUT_SECS").unwrap_or(20),
            ),
            prediction_top_k: env_parse("MEDFUSE_PREDICTION_TOP_K").unwrap_or(5),
            summary_max_chars: env_parse("MEDFUSE_SUMMARY_MAX_CHARS").unwrap_or(512),
            max_recommendations: env_parse("MEDFUSE_MAX_RECOMMENDATIONS").unwrap_or(6),
            score_blend_alpha: env_parse("MEDFUSE_SCORE_BLEND_ALPHA").unwrap_or(0.4),
        }
    }

    /// Per-patient personalization root: `<data_dir>/patients/`.
    pub fn patients_dir(&self) -> PathBuf {
        self.data_dir.join("patients")
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Get the application data directory, `~/Medfuse/` unless overridden.
pub fn default_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Medfuse")
}

/// System-wide default fusion weights. Unknown modalities resolve to 1.0
/// at lookup time, not here.
pub fn default_weights() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("tabular".to_string(), 0.5),
        ("text".to_string(), 0.3),
        ("image".to_string(), 0.2),
    ])
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().map(PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_data_dir_under_home() {
        let dir = default_data_dir();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with("Medfuse"));
    }

    #[test]
    fn default_weights_cover_all_modalities() {
        let weights = default_weights();
        assert_eq!(weights.get("tabular"), Some(&0.5));
        assert_eq!(weights.get("text"), Some(&0.3));
        assert_eq!(weights.get("image"), Some(&0.2));
        assert_eq!(weights.len(), 3);
    }

    #[test]
    fn settings_have_sane_defaults() {
        let settings = Settings::from_env();
        assert!(settings.max_concurrent_inferences >= 1);
        assert!(settings.adapter_timeout.as_secs() >= 1);
        assert!(settings.score_blend_alpha >= 0.0 && settings.score_blend_alpha <= 1.0);
        assert!(settings.patients_dir().ends_with("patients"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }
}
