pub mod health;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::applications::handlers as application_handlers;
use crate::referrals::handlers as referral_handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Applications
        .route(
            "/api/v1/jobs/:job_id/applications",
            post(application_handlers::handle_submit_application)
                .get(application_handlers::handle_list_job_applications),
        )
        .route(
            "/api/v1/applications/:id/retry",
            post(application_handlers::handle_retry_scoring),
        )
        .route(
            "/api/v1/applications/:id/status",
            patch(application_handlers::handle_update_status),
        )
        .route(
            "/api/v1/applications/:id/feedback",
            post(application_handlers::handle_generate_feedback),
        )
        // Referrals
        .route(
            "/api/v1/referrals",
            post(referral_handlers::handle_submit_referral),
        )
        .with_state(state)
}
