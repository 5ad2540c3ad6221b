//! Prometheus metrics for observability.
//!
//! Counters track pipeline runs and task throughput; gauges for task and
//! transcript counts are collected from the store right before encoding.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

use taskforge_core::store::{ApprovalStatus, DeliveryStatus, TaskFilter};
use taskforge_core::{RunStage, RunSummary};

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Pipeline runs by terminal stage.
pub static PIPELINE_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("taskforge_pipeline_runs_total", "Pipeline runs by outcome"),
        &["outcome"],
    )
    .unwrap()
});

/// Transcripts fetched from the upstream source.
pub static TRANSCRIPTS_FETCHED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "taskforge_transcripts_fetched_total",
        "Transcripts fetched across all runs",
    )
    .unwrap()
});

/// Tasks extracted by the LLM.
pub static TASKS_EXTRACTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "taskforge_tasks_extracted_total",
        "Tasks extracted since startup",
    )
    .unwrap()
});

/// Tasks delivered to the work item sink.
pub static TASKS_DELIVERED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "taskforge_tasks_delivered_total",
        "Tasks delivered since startup",
    )
    .unwrap()
});

/// Delivery attempts that ended in failure.
pub static DELIVERIES_FAILED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "taskforge_deliveries_failed_total",
        "Failed delivery attempts since startup",
    )
    .unwrap()
});

// =============================================================================
// Store Metrics (collected dynamically)
// =============================================================================

/// Tasks by review state.
pub static TASKS_BY_APPROVAL: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "taskforge_tasks_by_approval",
            "Current task count by approval status",
        ),
        &["status"],
    )
    .unwrap()
});

/// Tasks by delivery state.
pub static TASKS_BY_DELIVERY: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "taskforge_tasks_by_delivery",
            "Current task count by delivery status",
        ),
        &["status"],
    )
    .unwrap()
});

/// Transcripts persisted in the store.
pub static TRANSCRIPTS_STORED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "taskforge_transcripts_stored",
        "Number of transcripts in the store",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(PIPELINE_RUNS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(TRANSCRIPTS_FETCHED_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(TASKS_EXTRACTED_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(TASKS_DELIVERED_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(DELIVERIES_FAILED_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(TASKS_BY_APPROVAL.clone()))
        .unwrap();
    registry
        .register(Box::new(TASKS_BY_DELIVERY.clone()))
        .unwrap();
    registry
        .register(Box::new(TRANSCRIPTS_STORED.clone()))
        .unwrap();
}

/// Bump the run counters from a finished run summary.
pub fn record_run(summary: &RunSummary) {
    let outcome = match summary.stage {
        RunStage::Failed => "failed",
        RunStage::AwaitingReview => "awaiting_review",
        _ => "completed",
    };
    PIPELINE_RUNS_TOTAL.with_label_values(&[outcome]).inc();
    TRANSCRIPTS_FETCHED_TOTAL.inc_by(summary.transcripts_fetched as u64);
    TASKS_EXTRACTED_TOTAL.inc_by(summary.tasks_extracted as u64);
    TASKS_DELIVERED_TOTAL.inc_by(summary.tasks_delivered as u64);
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Refresh store-backed gauges from current application state.
pub fn collect_dynamic_metrics(state: &AppState) {
    for status in [
        ApprovalStatus::Pending,
        ApprovalStatus::Approved,
        ApprovalStatus::Rejected,
    ] {
        if let Ok(count) = state
            .tasks()
            .count(&TaskFilter::new().with_approval(status))
        {
            let label = format!("{:?}", status).to_lowercase();
            TASKS_BY_APPROVAL.with_label_values(&[&label]).set(count);
        }
    }

    for status in [
        DeliveryStatus::Pending,
        DeliveryStatus::Delivered,
        DeliveryStatus::Failed,
    ] {
        if let Ok(count) = state
            .tasks()
            .count(&TaskFilter::new().with_delivery(status))
        {
            let label = format!("{:?}", status).to_lowercase();
            TASKS_BY_DELIVERY.with_label_values(&[&label]).set(count);
        }
    }

    if let Ok(count) = state.transcripts().count() {
        TRANSCRIPTS_STORED.set(count);
    }
}
