pub mod adapters;
pub mod api;
pub mod config;
pub mod core_state;
pub mod dashboard;
pub mod fusion;
pub mod models;
pub mod personalization;
pub mod recommend;
pub mod store;
pub mod text;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber, env filter first.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
