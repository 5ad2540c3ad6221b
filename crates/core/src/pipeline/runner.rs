//! Pipeline runner implementation.
//!
//! Drives a run through its stages: fetch transcripts, extract tasks,
//! persist them behind the review gate, optionally deliver approved work.
//! Unit failures are recorded and skipped; only exhausted credentials or a
//! failed fetch abort the run.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::delivery::{DeliveryOutcome, DeliveryService};
use crate::extractor::{ExtractionEngine, LlmError};
use crate::source::{SourceError, TranscriptSource};
use crate::store::{
    ApprovalStatus, DeliveryStatus, ExtractedTask, StoreError, TaskFilter, TaskStore,
    TranscriptStore,
};
use crate::transcript::RawTranscript;

use super::types::{RunOptions, RunStage, RunSummary};

/// Orchestrates one end-to-end run over injected stage implementations.
pub struct PipelineRunner {
    source: Arc<dyn TranscriptSource>,
    engine: Arc<ExtractionEngine>,
    transcripts: Arc<dyn TranscriptStore>,
    tasks: Arc<dyn TaskStore>,
    delivery: Arc<DeliveryService>,
    audit: Option<AuditHandle>,
    max_items_per_run: u32,
    auto_deliver_default: bool,
}

impl PipelineRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn TranscriptSource>,
        engine: Arc<ExtractionEngine>,
        transcripts: Arc<dyn TranscriptStore>,
        tasks: Arc<dyn TaskStore>,
        delivery: Arc<DeliveryService>,
        audit: Option<AuditHandle>,
        max_items_per_run: u32,
        auto_deliver_default: bool,
    ) -> Self {
        Self {
            source,
            engine,
            transcripts,
            tasks,
            delivery,
            audit,
            max_items_per_run,
            auto_deliver_default,
        }
    }

    async fn emit(&self, event: AuditEvent) {
        if let Some(audit) = &self.audit {
            audit.emit(event).await;
        }
    }

    /// Run the pipeline once and report what happened.
    pub async fn run(&self, options: RunOptions) -> RunSummary {
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut summary = RunSummary::new(run_id.clone(), options.dry_run);
        info!(run = %run_id, ?options, "pipeline run starting");

        summary.stage = RunStage::Fetching;
        let fetched = match self.fetch(&options).await {
            Ok(fetched) => fetched,
            Err(e) => {
                error!(run = %run_id, error = %e, "fetch stage failed");
                summary.errors.push(format!("fetch: {}", e));
                return self.finish(summary, RunStage::Failed).await;
            }
        };
        summary.transcripts_fetched = fetched.len();

        let limit = options.limit.unwrap_or(u32::MAX) as usize;
        for raw in fetched.iter().take(limit) {
            match self.process_transcript(raw, &options, &mut summary).await {
                Ok(()) => {}
                Err(ProcessError::DependencyUnavailable(message)) => {
                    warn!(run = %run_id, error = %message, "extraction dependency unavailable");
                    summary
                        .errors
                        .push(format!("dependency unavailable: {}", message));
                    break;
                }
                Err(ProcessError::Fatal(message)) => {
                    error!(run = %run_id, error = %message, "pipeline run aborted");
                    summary.errors.push(message);
                    return self.finish(summary, RunStage::Failed).await;
                }
                Err(ProcessError::Unit(message)) => {
                    warn!(run = %run_id, error = %message, "transcript skipped");
                    summary.errors.push(message);
                }
            }
        }

        let auto_deliver = options.auto_deliver.unwrap_or(self.auto_deliver_default);
        if !auto_deliver {
            return self.finish(summary, RunStage::AwaitingReview).await;
        }

        summary.stage = RunStage::Delivering;
        self.deliver_approved(&options, &mut summary).await;
        self.finish(summary, RunStage::Completed).await
    }

    async fn fetch(&self, options: &RunOptions) -> Result<Vec<RawTranscript>, SourceError> {
        match &options.transcript_id {
            Some(id) => match self.source.fetch_by_id(id).await? {
                Some(raw) => Ok(vec![raw]),
                None => Ok(Vec::new()),
            },
            None => self.source.fetch_comprehensive(options.force_refresh).await,
        }
    }

    async fn process_transcript(
        &self,
        raw: &RawTranscript,
        options: &RunOptions,
        summary: &mut RunSummary,
    ) -> Result<(), ProcessError> {
        summary.stage = RunStage::Persisting;
        let cached = self
            .transcripts
            .upsert(raw)
            .map_err(|e| ProcessError::Unit(format!("transcript {}: {}", raw.id, e)))?;
        self.emit(AuditEvent::TranscriptCached {
            transcript_id: cached.external_id.clone(),
            title: cached.meeting_title.clone(),
            meeting_date: cached.meeting_date,
        })
        .await;

        if cached.processed && !options.force_refresh {
            info!(transcript = %cached.external_id, "already processed, skipping");
            return Ok(());
        }

        summary.stage = RunStage::Extracting;
        let tasks = match self.engine.extract(raw).await {
            Ok(tasks) => tasks,
            Err(LlmError::CircuitOpen(name)) => {
                return Err(ProcessError::DependencyUnavailable(format!(
                    "circuit breaker '{}' is open",
                    name
                )));
            }
            Err(e @ LlmError::AllKeysExhausted(_)) => {
                return Err(ProcessError::Fatal(e.to_string()));
            }
            Err(e) => {
                return Err(ProcessError::Unit(format!(
                    "transcript {}: extraction failed: {}",
                    raw.id, e
                )));
            }
        };

        summary.stage = RunStage::Persisting;
        let extracted = tasks.len();
        match self
            .tasks
            .insert_tasks(&cached.external_id, tasks, options.force_refresh)
        {
            Ok(_) => {}
            Err(StoreError::AlreadyExtracted(_)) => {
                info!(transcript = %cached.external_id, "tasks already extracted");
                return Ok(());
            }
            Err(e) => {
                return Err(ProcessError::Unit(format!(
                    "transcript {}: persist failed: {}",
                    cached.external_id, e
                )));
            }
        }
        self.transcripts
            .mark_processed(&cached.external_id)
            .map_err(|e| ProcessError::Unit(format!("transcript {}: {}", cached.external_id, e)))?;

        summary.transcripts_processed += 1;
        summary.tasks_extracted += extracted;
        self.emit(AuditEvent::ExtractionCompleted {
            transcript_id: cached.external_id.clone(),
            tasks_extracted: extracted,
        })
        .await;
        Ok(())
    }

    /// Deliver approved, undelivered tasks up to the per-run cap, skipping
    /// duplicates by normalized description within the run.
    async fn deliver_approved(&self, options: &RunOptions, summary: &mut RunSummary) {
        let filter = TaskFilter::new()
            .with_approval(ApprovalStatus::Approved)
            .with_delivery(DeliveryStatus::Pending);
        let candidates = match self.tasks.list(&filter) {
            Ok(tasks) => tasks,
            Err(e) => {
                summary.errors.push(format!("delivery listing: {}", e));
                return;
            }
        };

        let mut seen: Vec<String> = Vec::new();
        let mut batch: Vec<ExtractedTask> = Vec::new();
        for task in candidates {
            if batch.len() >= self.max_items_per_run as usize {
                break;
            }
            let normalized = normalize_description(&task.task_item);
            if seen.contains(&normalized) {
                continue;
            }
            seen.push(normalized);
            batch.push(task);
        }

        if options.dry_run {
            summary.would_deliver = batch.len();
            info!(count = batch.len(), "dry run, skipping delivery");
            return;
        }

        for outcome in self.delivery.deliver_batch(&batch).await {
            match outcome {
                DeliveryOutcome::Delivered {
                    task_id,
                    remote_item_id,
                } => {
                    summary.tasks_delivered += 1;
                    let transcript_id = self.transcript_of(&task_id);
                    self.emit(AuditEvent::TaskDelivered {
                        task_id,
                        transcript_id,
                        remote_item_id,
                    })
                    .await;
                }
                DeliveryOutcome::AlreadyDelivered { .. } | DeliveryOutcome::Skipped { .. } => {}
                DeliveryOutcome::Failed { task_id, error } => {
                    summary
                        .errors
                        .push(format!("delivery of {}: {}", task_id, error));
                    let transcript_id = self.transcript_of(&task_id);
                    self.emit(AuditEvent::DeliveryFailed {
                        task_id,
                        transcript_id,
                        error,
                    })
                    .await;
                }
            }
        }
    }

    fn transcript_of(&self, task_id: &str) -> String {
        self.tasks
            .get_task(task_id)
            .ok()
            .flatten()
            .map(|t| t.transcript_external_id)
            .unwrap_or_default()
    }

    async fn finish(&self, mut summary: RunSummary, stage: RunStage) -> RunSummary {
        summary.stage = stage;
        summary.finished_at = Some(chrono::Utc::now());
        self.emit(AuditEvent::RunCompleted {
            run_id: summary.run_id.clone(),
            stage: stage.as_str().to_string(),
            transcripts_processed: summary.transcripts_processed,
            tasks_extracted: summary.tasks_extracted,
            tasks_delivered: summary.tasks_delivered,
            errors: summary.errors.len(),
        })
        .await;
        info!(
            run = %summary.run_id,
            stage = stage.as_str(),
            processed = summary.transcripts_processed,
            extracted = summary.tasks_extracted,
            delivered = summary.tasks_delivered,
            errors = summary.errors.len(),
            "pipeline run finished"
        );
        summary
    }
}

enum ProcessError {
    /// This transcript failed; the run continues.
    Unit(String),
    /// The LLM breaker is open; stop extracting for this run.
    DependencyUnavailable(String),
    /// The whole run cannot make progress.
    Fatal(String),
}

fn normalize_description(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
