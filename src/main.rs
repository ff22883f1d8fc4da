use std::sync::Arc;

use medfuse::api::start_server;
use medfuse::config::{self, Settings};
use medfuse::core_state::CoreState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    medfuse::init_tracing();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let settings = Settings::from_env();
    let bind_addr = settings.bind_addr;
    let core = Arc::new(CoreState::new(settings));

    let mut server = start_server(core, bind_addr).await?;
    tracing::info!(addr = %server.addr, "listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    server.shutdown();

    Ok(())
}
