mod applications;
mod config;
mod db;
mod errors;
mod oracle;
mod referrals;
mod routes;
mod scoring;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::oracle::WorkflowClient;
use crate::routes::build_router;
use crate::scoring::cost::CostTable;
use crate::scoring::evidence::EvidenceLinker;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Vouchpoint API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize the workflow-service oracle client (scoring + feedback)
    let workflow = Arc::new(WorkflowClient::new(
        config.workflow_base_url.clone(),
        config.workflow_api_key.clone(),
    ));
    info!("Workflow oracle client initialized ({})", config.workflow_base_url);

    // Process-wide immutable configuration: model rate table and the
    // evidence-linker stop-word set, built once and injected via state.
    let state = AppState {
        db,
        config: config.clone(),
        scoring_oracle: workflow.clone(),
        feedback_oracle: workflow,
        cost_table: Arc::new(CostTable::default()),
        evidence_linker: Arc::new(EvidenceLinker::default()),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
