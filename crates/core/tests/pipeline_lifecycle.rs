//! Pipeline lifecycle integration tests.
//!
//! Exercise the full run with mock source, LLM and sink:
//! - fetch -> extract -> persist -> review gate -> deliver
//! - audit trail written by the background writer
//! - idempotent re-runs and delivery bookkeeping

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use taskforge_core::{
    audit::{create_audit_system, AuditFilter, AuditStore, SqliteAuditStore},
    cache::{CacheManager, MemoryCache},
    delivery::DeliveryService,
    extractor::{ExtractionEngine, PromptTemplate},
    pipeline::{PipelineRunner, RunOptions, RunStage},
    store::{ApprovalStatus, DeliveryStatus, SqliteStore, TaskFilter, TaskStore, TranscriptStore},
    testing::{fixtures, MockLlmClient, MockTranscriptSource, MockWorkItemSink},
};

struct TestHarness {
    runner: PipelineRunner,
    store: Arc<SqliteStore>,
    audit_store: Arc<SqliteAuditStore>,
    sink: Arc<MockWorkItemSink>,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new(source: MockTranscriptSource, llm: MockLlmClient) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let store = Arc::new(
            SqliteStore::new(&temp_dir.path().join("taskforge.db"))
                .expect("failed to create store"),
        );
        let audit_store =
            Arc::new(SqliteAuditStore::in_memory().expect("failed to create audit store"));
        let (audit_handle, writer) =
            create_audit_system(Arc::clone(&audit_store) as Arc<dyn AuditStore>, 100);
        tokio::spawn(writer.run());

        let cache = Arc::new(CacheManager::new(
            Arc::new(MemoryCache::new()),
            Duration::from_secs(1800),
        ));
        let engine = Arc::new(ExtractionEngine::new(
            Arc::new(llm),
            PromptTemplate::standard(),
            cache,
            Duration::from_secs(1800),
        ));
        let sink = Arc::new(MockWorkItemSink::new());
        let delivery = Arc::new(DeliveryService::new(
            Arc::clone(&sink) as _,
            Arc::clone(&store) as _,
            Duration::ZERO,
        ));
        let runner = PipelineRunner::new(
            Arc::new(source),
            engine,
            Arc::clone(&store) as _,
            Arc::clone(&store) as _,
            delivery,
            Some(audit_handle),
            5,
            false,
        );

        Self {
            runner,
            store,
            audit_store,
            sink,
            _temp_dir: temp_dir,
        }
    }

    async fn audit_events(&self, event_type: &str) -> usize {
        // The writer runs in the background; give it a beat to drain.
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.audit_store
            .count(&AuditFilter::new().with_event_type(event_type))
            .unwrap() as usize
    }
}

fn weekly_sync_harness() -> TestHarness {
    let source = MockTranscriptSource::with_transcripts(vec![fixtures::transcript(
        "t-weekly",
        "Weekly Sync",
        1750057200000,
    )]);
    let llm = MockLlmClient::with_response(&fixtures::extraction_output(
        "Draft the proposal for the client covering scope and pricing",
    ));
    TestHarness::new(source, llm)
}

#[tokio::test]
async fn test_full_lifecycle_extract_review_deliver() {
    let h = weekly_sync_harness();

    // First run extracts tasks and stops at the review gate.
    let summary = h.runner.run(RunOptions::default()).await;
    assert_eq!(summary.stage, RunStage::AwaitingReview);
    assert_eq!(summary.tasks_extracted, 1);
    assert_eq!(h.sink.call_count(), 0);

    let transcript = h.store.get("t-weekly").unwrap().unwrap();
    assert!(transcript.processed);
    assert_eq!(transcript.meeting_title, "Weekly Sync");

    // A reviewer approves the pending task.
    let pending = h
        .store
        .list(&TaskFilter::new().with_approval(ApprovalStatus::Pending))
        .unwrap();
    assert_eq!(pending.len(), 1);
    let approved = h.store.approve(&pending[0].id, "alice", None).unwrap();
    assert_eq!(approved.approval_status, ApprovalStatus::Approved);
    assert_eq!(approved.reviewer.as_deref(), Some("alice"));

    // Second run delivers the approved task.
    let summary = h
        .runner
        .run(RunOptions {
            auto_deliver: Some(true),
            ..Default::default()
        })
        .await;
    assert_eq!(summary.stage, RunStage::Completed);
    assert_eq!(summary.tasks_delivered, 1);
    assert_eq!(h.sink.call_count(), 1);

    let delivered = h.store.get_task(&approved.id).unwrap().unwrap();
    assert_eq!(delivered.delivery.status, DeliveryStatus::Delivered);
    assert!(delivered.delivery.remote_item_id.is_some());
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let h = weekly_sync_harness();

    h.runner.run(RunOptions::default()).await;
    let summary = h.runner.run(RunOptions::default()).await;

    // Transcript already processed; nothing is re-extracted.
    assert_eq!(summary.transcripts_processed, 0);
    let tasks = h.store.list(&TaskFilter::new()).unwrap();
    assert_eq!(tasks.len(), 1);
}

#[tokio::test]
async fn test_rejected_tasks_are_never_delivered() {
    let h = weekly_sync_harness();

    h.runner.run(RunOptions::default()).await;
    let pending = h.store.list(&TaskFilter::new()).unwrap();
    h.store
        .reject(&pending[0].id, "alice", Some("not actionable".into()))
        .unwrap();

    let summary = h
        .runner
        .run(RunOptions {
            auto_deliver: Some(true),
            ..Default::default()
        })
        .await;

    assert_eq!(summary.tasks_delivered, 0);
    assert_eq!(h.sink.call_count(), 0);
}

#[tokio::test]
async fn test_delivered_task_is_not_sent_twice() {
    let h = weekly_sync_harness();

    h.runner.run(RunOptions::default()).await;
    let pending = h.store.list(&TaskFilter::new()).unwrap();
    h.store.approve(&pending[0].id, "alice", None).unwrap();

    let deliver = RunOptions {
        auto_deliver: Some(true),
        ..Default::default()
    };
    h.runner.run(deliver.clone()).await;
    let summary = h.runner.run(deliver).await;

    assert_eq!(summary.tasks_delivered, 0);
    assert_eq!(h.sink.call_count(), 1);
}

#[tokio::test]
async fn test_audit_trail_covers_the_run() {
    let h = weekly_sync_harness();

    h.runner.run(RunOptions::default()).await;
    assert_eq!(h.audit_events("transcript_cached").await, 1);
    assert_eq!(h.audit_events("extraction_completed").await, 1);
    assert_eq!(h.audit_events("run_completed").await, 1);

    let pending = h.store.list(&TaskFilter::new()).unwrap();
    h.store.approve(&pending[0].id, "alice", None).unwrap();
    h.runner
        .run(RunOptions {
            auto_deliver: Some(true),
            ..Default::default()
        })
        .await;

    assert_eq!(h.audit_events("task_delivered").await, 1);
    assert_eq!(h.audit_events("run_completed").await, 2);
}

#[tokio::test]
async fn test_dry_run_leaves_no_trace_on_the_sink() {
    let h = weekly_sync_harness();

    h.runner.run(RunOptions::default()).await;
    let pending = h.store.list(&TaskFilter::new()).unwrap();
    h.store.approve(&pending[0].id, "alice", None).unwrap();

    let summary = h
        .runner
        .run(RunOptions {
            dry_run: true,
            auto_deliver: Some(true),
            ..Default::default()
        })
        .await;

    assert_eq!(summary.would_deliver, 1);
    assert_eq!(h.sink.call_count(), 0);
    let task = &h.store.list(&TaskFilter::new()).unwrap()[0];
    assert_eq!(task.delivery.status, DeliveryStatus::Pending);
}
