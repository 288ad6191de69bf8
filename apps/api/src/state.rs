use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::oracle::{FeedbackOracle, ScoringOracle};
use crate::scoring::cost::CostTable;
use crate::scoring::evidence::EvidenceLinker;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    /// Pluggable scoring oracle. Production wiring uses the workflow-service
    /// HTTP client; tests swap in mocks.
    pub scoring_oracle: Arc<dyn ScoringOracle>,
    pub feedback_oracle: Arc<dyn FeedbackOracle>,
    /// Per-model token rate table, immutable after startup.
    pub cost_table: Arc<CostTable>,
    /// Stop-word set and span matcher for evidence linking.
    pub evidence_linker: Arc<EvidenceLinker>,
}
