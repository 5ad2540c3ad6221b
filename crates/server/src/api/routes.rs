use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{audit, handlers, pipeline, tasks};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/config", get(handlers::get_config))
        // Audit
        .route("/audit", get(audit::query_audit))
        // Pipeline
        .route("/pipeline/run", post(pipeline::run_pipeline))
        // Tasks and review
        .route("/tasks", get(tasks::list_tasks))
        .route("/tasks/deliver", post(tasks::deliver_tasks))
        .route("/tasks/{id}", get(tasks::get_task))
        .route("/tasks/{id}/approve", post(tasks::approve_task))
        .route("/tasks/{id}/reject", post(tasks::reject_task));

    Router::new()
        .nest("/api", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
