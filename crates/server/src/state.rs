use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use taskforge_core::audit::{AuditHandle, AuditStore};
use taskforge_core::delivery::DeliveryService;
use taskforge_core::store::{TaskStore, TranscriptStore};
use taskforge_core::{Config, HealthMonitor, PipelineRunner, RunSummary, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    runner: Arc<PipelineRunner>,
    delivery: Arc<DeliveryService>,
    tasks: Arc<dyn TaskStore>,
    transcripts: Arc<dyn TranscriptStore>,
    audit: AuditHandle,
    audit_store: Arc<dyn AuditStore>,
    health: Arc<HealthMonitor>,
    /// Summary of the most recent pipeline run, finished or not.
    last_run: RwLock<Option<RunSummary>>,
    /// Held for the duration of a pipeline run; only one run at a time.
    run_guard: Mutex<()>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        runner: Arc<PipelineRunner>,
        delivery: Arc<DeliveryService>,
        tasks: Arc<dyn TaskStore>,
        transcripts: Arc<dyn TranscriptStore>,
        audit: AuditHandle,
        audit_store: Arc<dyn AuditStore>,
        health: Arc<HealthMonitor>,
    ) -> Self {
        Self {
            config,
            runner,
            delivery,
            tasks,
            transcripts,
            audit,
            audit_store,
            health,
            last_run: RwLock::new(None),
            run_guard: Mutex::new(()),
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn runner(&self) -> &PipelineRunner {
        &self.runner
    }

    pub fn delivery(&self) -> &DeliveryService {
        &self.delivery
    }

    pub fn tasks(&self) -> &dyn TaskStore {
        self.tasks.as_ref()
    }

    pub fn transcripts(&self) -> &dyn TranscriptStore {
        self.transcripts.as_ref()
    }

    pub fn audit(&self) -> &AuditHandle {
        &self.audit
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn last_run(&self) -> &RwLock<Option<RunSummary>> {
        &self.last_run
    }

    pub fn run_guard(&self) -> &Mutex<()> {
        &self.run_guard
    }
}
