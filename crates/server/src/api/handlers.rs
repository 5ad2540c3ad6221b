use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use taskforge_core::store::{ApprovalStatus, DeliveryStatus, TaskFilter};
use taskforge_core::{HealthSnapshot, RunStage, RunSummary, SanitizedConfig};

use crate::metrics;
use crate::state::AppState;

/// Health probe backed by a live dependency snapshot.
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthSnapshot>) {
    let snapshot = state.health().snapshot().await;
    let status = if snapshot.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(snapshot))
}

/// Current pipeline stage plus store counters.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub stage: RunStage,
    pub last_run: Option<RunSummary>,
    pub transcripts: i64,
    pub tasks_pending_review: i64,
    pub tasks_approved: i64,
    pub tasks_delivered: i64,
}

pub async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<super::tasks::ErrorResponse>)> {
    let last_run = state.last_run().read().await.clone();
    let stage = last_run.as_ref().map(|s| s.stage).unwrap_or_default();

    let count = |filter: &TaskFilter| {
        state.tasks().count(filter).map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(super::tasks::ErrorResponse {
                    error: e.to_string(),
                }),
            )
        })
    };

    let tasks_pending_review = count(&TaskFilter::new().with_approval(ApprovalStatus::Pending))?;
    let tasks_approved = count(&TaskFilter::new().with_approval(ApprovalStatus::Approved))?;
    let tasks_delivered = count(&TaskFilter::new().with_delivery(DeliveryStatus::Delivered))?;
    let transcripts = state.transcripts().count().map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(super::tasks::ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    Ok(Json(StatusResponse {
        stage,
        last_run,
        transcripts,
        tasks_pending_review,
        tasks_approved,
        tasks_delivered,
    }))
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    metrics::collect_dynamic_metrics(&state);
    metrics::encode_metrics()
}
