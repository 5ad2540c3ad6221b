//! Task review and delivery handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use taskforge_core::audit::AuditEvent;
use taskforge_core::delivery::DeliveryOutcome;
use taskforge_core::store::{
    ApprovalStatus, DeliveryStatus, ExtractedTask, StoreError, TaskFilter,
};

use crate::metrics;
use crate::state::AppState;

/// Maximum allowed limit for task listings
const MAX_LIMIT: u32 = 1000;

/// Default limit for task listings
const DEFAULT_LIMIT: u32 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing tasks
#[derive(Debug, Deserialize)]
pub struct ListTasksParams {
    /// Filter by review verdict
    pub approval: Option<ApprovalStatus>,
    /// Filter by delivery state
    pub delivery: Option<DeliveryStatus>,
    /// Filter by source transcript external id
    pub transcript_id: Option<String>,
    /// Maximum number of tasks to return
    pub limit: Option<u32>,
    /// Pagination offset
    pub offset: Option<u32>,
}

/// Request body for review verdicts
#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    pub reviewer: String,
    pub notes: Option<String>,
}

/// Request body for triggering delivery
#[derive(Debug, Default, Deserialize)]
pub struct DeliverBody {
    /// Explicit task ids; when absent, all deliverable approved tasks go.
    pub ids: Option<Vec<String>>,
}

/// Response for listing tasks
#[derive(Debug, Serialize)]
pub struct ListTasksResponse {
    pub tasks: Vec<ExtractedTask>,
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
}

/// Response for the delivery trigger
#[derive(Debug, Serialize)]
pub struct DeliverResponse {
    pub delivered: usize,
    pub failed: usize,
    pub skipped: usize,
    pub outcomes: Vec<DeliveryOutcome>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error(e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

fn not_found(id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Task not found: {}", id),
        }),
    )
}

fn map_store_error(id: &str, e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound(_) => not_found(id),
        other => internal_error(other),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// List tasks with optional filters
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTasksParams>,
) -> Result<Json<ListTasksResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0);

    let mut base_filter = TaskFilter::new();
    if let Some(approval) = params.approval {
        base_filter = base_filter.with_approval(approval);
    }
    if let Some(delivery) = params.delivery {
        base_filter = base_filter.with_delivery(delivery);
    }
    if let Some(ref transcript_id) = params.transcript_id {
        base_filter = base_filter.with_transcript(transcript_id.clone());
    }

    let mut page_filter = base_filter.clone().with_limit(limit);
    page_filter.offset = offset;

    let tasks = state.tasks().list(&page_filter).map_err(internal_error)?;
    let total = state.tasks().count(&base_filter).map_err(internal_error)?;

    Ok(Json(ListTasksResponse {
        tasks,
        total,
        limit,
        offset,
    }))
}

/// Get a task by id
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ExtractedTask>, ApiError> {
    match state.tasks().get_task(&id) {
        Ok(Some(task)) => Ok(Json(task)),
        Ok(None) => Err(not_found(&id)),
        Err(e) => Err(internal_error(e)),
    }
}

/// Approve a pending task
pub async fn approve_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReviewBody>,
) -> Result<Json<ExtractedTask>, ApiError> {
    let task = state
        .tasks()
        .approve(&id, &body.reviewer, body.notes)
        .map_err(|e| map_store_error(&id, e))?;

    state.audit().try_emit(AuditEvent::TaskApproved {
        task_id: task.id.clone(),
        transcript_id: task.transcript_external_id.clone(),
        reviewer: body.reviewer,
    });

    Ok(Json(task))
}

/// Reject a pending task
pub async fn reject_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReviewBody>,
) -> Result<Json<ExtractedTask>, ApiError> {
    let task = state
        .tasks()
        .reject(&id, &body.reviewer, body.notes)
        .map_err(|e| map_store_error(&id, e))?;

    state.audit().try_emit(AuditEvent::TaskRejected {
        task_id: task.id.clone(),
        transcript_id: task.transcript_external_id.clone(),
        reviewer: body.reviewer,
    });

    Ok(Json(task))
}

/// Push approved tasks to the work item sink.
///
/// With explicit ids, each task is loaded and handed to the delivery
/// service as-is; without them, every approved task still pending
/// delivery goes out.
pub async fn deliver_tasks(
    State(state): State<Arc<AppState>>,
    body: Option<Json<DeliverBody>>,
) -> Result<Json<DeliverResponse>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let tasks: Vec<ExtractedTask> = match body.ids {
        Some(ids) => {
            let mut tasks = Vec::with_capacity(ids.len());
            for id in &ids {
                match state.tasks().get_task(id).map_err(internal_error)? {
                    Some(task) => tasks.push(task),
                    None => return Err(not_found(id)),
                }
            }
            tasks
        }
        None => state
            .tasks()
            .list(
                &TaskFilter::new()
                    .with_approval(ApprovalStatus::Approved)
                    .with_delivery(DeliveryStatus::Pending),
            )
            .map_err(internal_error)?,
    };

    let outcomes = state.delivery().deliver_batch(&tasks).await;

    let mut delivered = 0;
    let mut failed = 0;
    let mut skipped = 0;
    for (task, outcome) in tasks.iter().zip(&outcomes) {
        match outcome {
            DeliveryOutcome::Delivered { remote_item_id, .. } => {
                delivered += 1;
                metrics::TASKS_DELIVERED_TOTAL.inc();
                state.audit().try_emit(AuditEvent::TaskDelivered {
                    task_id: task.id.clone(),
                    transcript_id: task.transcript_external_id.clone(),
                    remote_item_id: remote_item_id.clone(),
                });
            }
            DeliveryOutcome::Failed { error, .. } => {
                failed += 1;
                metrics::DELIVERIES_FAILED_TOTAL.inc();
                state.audit().try_emit(AuditEvent::DeliveryFailed {
                    task_id: task.id.clone(),
                    transcript_id: task.transcript_external_id.clone(),
                    error: error.clone(),
                });
            }
            DeliveryOutcome::AlreadyDelivered { .. } | DeliveryOutcome::Skipped { .. } => {
                skipped += 1;
            }
        }
    }

    Ok(Json(DeliverResponse {
        delivered,
        failed,
        skipped,
        outcomes,
    }))
}
