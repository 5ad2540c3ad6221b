//! Types for the pipeline runner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stage a pipeline run is in, or finished at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    #[default]
    Idle,
    Fetching,
    Extracting,
    Persisting,
    AwaitingReview,
    Delivering,
    Completed,
    Failed,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Idle => "idle",
            RunStage::Fetching => "fetching",
            RunStage::Extracting => "extracting",
            RunStage::Persisting => "persisting",
            RunStage::AwaitingReview => "awaiting_review",
            RunStage::Delivering => "delivering",
            RunStage::Completed => "completed",
            RunStage::Failed => "failed",
        }
    }
}

/// Flags controlling one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOptions {
    /// Report what would be delivered without sending anything.
    #[serde(default)]
    pub dry_run: bool,
    /// Bypass caches and re-extract transcripts that were already processed.
    #[serde(default)]
    pub force_refresh: bool,
    /// Cap on how many transcripts this run touches.
    #[serde(default)]
    pub limit: Option<u32>,
    /// Restrict the run to a single transcript.
    #[serde(default)]
    pub transcript_id: Option<String>,
    /// Deliver approved tasks at the end of the run instead of stopping at
    /// the review gate. Unset falls back to the configured default.
    #[serde(default)]
    pub auto_deliver: Option<bool>,
}

/// Structured report of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub stage: RunStage,
    pub dry_run: bool,
    pub transcripts_fetched: usize,
    pub transcripts_processed: usize,
    pub tasks_extracted: usize,
    pub tasks_delivered: usize,
    /// Tasks a dry run would have delivered.
    pub would_deliver: usize,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub fn new(run_id: String, dry_run: bool) -> Self {
        Self {
            run_id,
            stage: RunStage::Idle,
            dry_run,
            transcripts_fetched: 0,
            transcripts_processed: 0,
            tasks_extracted: 0,
            tasks_delivered: 0,
            would_deliver: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}
