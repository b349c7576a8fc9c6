//! HTTP server for qeekd.

use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::AuthClient;
use crate::config::Config;
use crate::db::{ConversationStore, PostgrestRepo};
use crate::gateway::{DiagnosisGateway, ResourceGateway, ResponseGateway};
use crate::llm::{CompletionService, OpenAiClient};
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::routes;
use crate::signal::ViewInvalidator;
use crate::store::StoreClient;

/// Application state shared across handlers. Every service is constructed
/// here and injected; nothing is a process-wide singleton.
pub struct AppState {
    pub config: Config,
    pub orchestrator: Orchestrator,
    pub repo: Arc<PostgrestRepo>,
    pub resources_gateway: ResourceGateway,
    pub auth: AuthClient,
    pub invalidator: ViewInvalidator,
    pub start_time: Instant,
}

impl AppState {
    pub fn from_config(config: Config) -> Self {
        let store_client = StoreClient::new(&config.backend.url, &config.backend.service_key);
        let repo = PostgrestRepo::new(
            store_client,
            Duration::from_secs(config.cache.resources_ttl_secs),
        )
        .into_shared();

        // Absent credential keeps the app usable: the gateways degrade to
        // fixed replies instead of failing startup.
        let completion: Option<Arc<dyn CompletionService>> =
            config.llm.api_key.as_ref().map(|api_key| {
                Arc::new(OpenAiClient::new(
                    api_key.clone(),
                    Some(config.llm.model.clone()),
                    Duration::from_secs(config.llm.reply_timeout_secs),
                )) as Arc<dyn CompletionService>
            });

        let invalidator = ViewInvalidator::new();
        let orchestrator = Orchestrator::new(
            Arc::clone(&repo) as Arc<dyn ConversationStore>,
            Arc::new(ResponseGateway::new(completion.clone())),
            DiagnosisGateway::new(completion.clone()),
            invalidator.clone(),
            OrchestratorSettings::from_config(&config),
        );

        AppState {
            auth: AuthClient::new(&config.backend.url, &config.backend.service_key),
            resources_gateway: ResourceGateway::new(completion),
            orchestrator,
            repo,
            invalidator,
            config,
            start_time: Instant::now(),
        }
    }
}

/// Run the HTTP server
pub async fn run(state: AppState) -> Result<()> {
    let addr = state.config.daemon.bind_addr.clone();
    let state = Arc::new(state);

    let app = Router::new()
        .merge(routes::question_routes())
        .merge(routes::resource_routes())
        .merge(routes::feedback_routes())
        .merge(routes::auth_routes())
        .merge(routes::admin_routes())
        .merge(routes::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("  Listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
