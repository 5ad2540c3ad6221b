//! Pipeline trigger endpoint.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use taskforge_core::{RunOptions, RunSummary};

use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RunConflictResponse {
    pub error: String,
}

/// Trigger a pipeline run. The summary is returned once the run finishes;
/// a second trigger while a run is in flight gets 409.
pub async fn run_pipeline(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RunOptions>>,
) -> Result<Json<RunSummary>, (StatusCode, Json<RunConflictResponse>)> {
    let options = body.map(|Json(options)| options).unwrap_or_default();

    let Ok(_guard) = state.run_guard().try_lock() else {
        return Err((
            StatusCode::CONFLICT,
            Json(RunConflictResponse {
                error: "a pipeline run is already in progress".to_string(),
            }),
        ));
    };

    info!(?options, "pipeline run triggered via API");
    let summary = state.runner().run(options).await;

    metrics::record_run(&summary);
    *state.last_run().write().await = Some(summary.clone());

    Ok(Json(summary))
}
