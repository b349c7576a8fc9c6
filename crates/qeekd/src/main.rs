//! Qeek daemon - conversational self-reflection backend.
//!
//! Persists questions and messages through the external store, generates
//! replies and diagnoses through the completion service, and serves the
//! chat UI's HTTP operations.

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use qeekd::config::Config;
use qeekd::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Qeek daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load();
    if config.llm.api_key.is_none() {
        warn!("OPENAI_API_KEY not set; replies degrade to the default sentence");
    }

    let state = AppState::from_config(config);
    server::run(state).await
}
