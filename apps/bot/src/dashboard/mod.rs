//! Read-only reporting surface. Every route here queries the store and
//! nothing more; all mutation goes through the workflows.

pub mod handlers;

use axum::{routing::get, Router};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::handle_health))
        .route("/api/stats", get(handlers::handle_stats))
        .route("/api/members", get(handlers::handle_members))
        .route("/api/jobs", get(handlers::handle_jobs))
        .route("/api/activity", get(handlers::handle_activity))
        .with_state(state)
}
