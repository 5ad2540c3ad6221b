//! Delivery orchestration: preconditions, retries, delivery bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::{DeliveryOutcome, SinkError, WorkItemSink};
use crate::resilience::{retry_with_policy, RetryPolicy};
use crate::store::{ApprovalStatus, ExtractedTask, TaskStore};

/// Pushes approved tasks to the configured sink one at a time.
///
/// Every outcome is recorded against the task store; a failing task never
/// aborts the batch.
pub struct DeliveryService {
    sink: Arc<dyn WorkItemSink>,
    tasks: Arc<dyn TaskStore>,
    retry: RetryPolicy,
    inter_item_delay: Duration,
}

impl DeliveryService {
    pub fn new(
        sink: Arc<dyn WorkItemSink>,
        tasks: Arc<dyn TaskStore>,
        inter_item_delay: Duration,
    ) -> Self {
        Self {
            sink,
            tasks,
            retry: RetryPolicy::default(),
            inter_item_delay,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Deliver one task. Already-delivered tasks are a no-op that reports
    /// the existing remote id; unapproved tasks are skipped.
    pub async fn deliver(&self, task: &ExtractedTask) -> DeliveryOutcome {
        if let Some(remote_item_id) = &task.delivery.remote_item_id {
            info!(task = %task.id, item = %remote_item_id, "task already delivered");
            return DeliveryOutcome::AlreadyDelivered {
                task_id: task.id.clone(),
                remote_item_id: remote_item_id.clone(),
            };
        }
        if task.approval_status != ApprovalStatus::Approved {
            return DeliveryOutcome::Skipped {
                task_id: task.id.clone(),
                reason: format!("approval status is {:?}", task.approval_status),
            };
        }

        let result: Result<String, SinkError> =
            retry_with_policy(&self.retry, "deliver_task", || self.sink.create_item(task)).await;

        match result {
            Ok(remote_item_id) => {
                if let Err(e) = self.tasks.record_delivery_success(&task.id, &remote_item_id) {
                    warn!(task = %task.id, error = %e, "delivered but failed to record");
                }
                DeliveryOutcome::Delivered {
                    task_id: task.id.clone(),
                    remote_item_id,
                }
            }
            Err(e) => {
                let message = e.to_string();
                warn!(task = %task.id, error = %message, "delivery failed");
                if let Err(e) = self.tasks.record_delivery_failure(&task.id, &message) {
                    warn!(task = %task.id, error = %e, "failed to record delivery error");
                }
                DeliveryOutcome::Failed {
                    task_id: task.id.clone(),
                    error: message,
                }
            }
        }
    }

    /// Deliver a batch sequentially with the configured inter-item delay.
    pub async fn deliver_batch(&self, tasks: &[ExtractedTask]) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            if i > 0 && !self.inter_item_delay.is_zero() {
                tokio::time::sleep(self.inter_item_delay).await;
            }
            outcomes.push(self.deliver(task).await);
        }
        let delivered = outcomes.iter().filter(|o| o.is_delivered()).count();
        info!(total = tasks.len(), delivered, "delivery batch finished");
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewTask, SqliteStore, TaskFilter, TranscriptStore};
    use crate::testing::MockWorkItemSink;
    use crate::transcript::RawTranscript;

    fn seeded_store() -> (Arc<SqliteStore>, ExtractedTask) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let raw: RawTranscript = serde_json::from_value(serde_json::json!({
            "id": "t-1",
            "title": "Weekly Sync"
        }))
        .unwrap();
        store.upsert(&raw).unwrap();
        let inserted = store
            .insert_tasks(
                "t-1",
                vec![NewTask {
                    task_item: "Draft the proposal for the client".into(),
                    ..NewTask::default()
                }],
                false,
            )
            .unwrap();
        let approved = store
            .approve(&inserted[0].id, "alice", None)
            .unwrap();
        (store, approved)
    }

    fn service(sink: Arc<MockWorkItemSink>, store: Arc<SqliteStore>) -> DeliveryService {
        DeliveryService::new(sink, store, Duration::ZERO)
            .with_retry_policy(RetryPolicy::immediate())
    }

    #[tokio::test]
    async fn test_deliver_approved_task() {
        let (store, task) = seeded_store();
        let sink = Arc::new(MockWorkItemSink::new());
        let outcome = service(Arc::clone(&sink), Arc::clone(&store))
            .deliver(&task)
            .await;

        assert!(matches!(outcome, DeliveryOutcome::Delivered { .. }));
        let reloaded = store.get_task(&task.id).unwrap().unwrap();
        assert!(reloaded.delivery.remote_item_id.is_some());
        assert!(reloaded.delivery.delivered_at.is_some());
        assert_eq!(sink.call_count(), 1);
    }

    #[tokio::test]
    async fn test_deliver_is_idempotent() {
        let (store, task) = seeded_store();
        let sink = Arc::new(MockWorkItemSink::new());
        let svc = service(Arc::clone(&sink), Arc::clone(&store));

        svc.deliver(&task).await;
        let delivered = store.get_task(&task.id).unwrap().unwrap();
        let outcome = svc.deliver(&delivered).await;

        assert!(matches!(outcome, DeliveryOutcome::AlreadyDelivered { .. }));
        assert_eq!(sink.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unapproved_task_is_skipped() {
        let (store, task) = seeded_store();
        let rejected = store.reject(&task.id, "alice", None).unwrap();
        let sink = Arc::new(MockWorkItemSink::new());
        let outcome = service(Arc::clone(&sink), store).deliver(&rejected).await;

        assert!(matches!(outcome, DeliveryOutcome::Skipped { .. }));
        assert_eq!(sink.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_not_fatal() {
        let (store, task) = seeded_store();
        let sink = Arc::new(MockWorkItemSink::new());
        sink.fail_next(SinkError::Graphql("bad column".into())).await;

        let outcome = service(sink, Arc::clone(&store)).deliver(&task).await;
        assert!(matches!(outcome, DeliveryOutcome::Failed { .. }));

        let reloaded = store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(reloaded.delivery.errors.len(), 1);
        assert!(reloaded.delivery.remote_item_id.is_none());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let (store, task) = seeded_store();
        let sink = Arc::new(MockWorkItemSink::new());
        sink.fail_next(SinkError::Transport("reset".into())).await;

        let outcome = service(Arc::clone(&sink), store).deliver(&task).await;
        assert!(matches!(outcome, DeliveryOutcome::Delivered { .. }));
        assert_eq!(sink.call_count(), 2);
    }

    #[tokio::test]
    async fn test_batch_continues_past_failures() {
        let (store, first) = seeded_store();
        let more = store
            .insert_tasks(
                "t-1",
                vec![
                    NewTask {
                        task_item: "First follow up with the vendor".into(),
                        ..NewTask::default()
                    },
                    NewTask {
                        task_item: "Second schedule the retro meeting".into(),
                        ..NewTask::default()
                    },
                ],
                true,
            )
            .unwrap();
        // Replacing dropped the original; approve the fresh pair.
        let a = store.approve(&more[0].id, "alice", None).unwrap();
        let b = store.approve(&more[1].id, "alice", None).unwrap();
        let _ = first;

        let sink = Arc::new(MockWorkItemSink::new());
        sink.fail_next(SinkError::Graphql("bad column".into())).await;

        let outcomes = service(sink, store).deliver_batch(&[a, b]).await;
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0], DeliveryOutcome::Failed { .. }));
        assert!(matches!(outcomes[1], DeliveryOutcome::Delivered { .. }));
    }

    #[tokio::test]
    async fn test_delivered_tasks_queryable_by_filter() {
        let (store, task) = seeded_store();
        let sink = Arc::new(MockWorkItemSink::new());
        service(sink, Arc::clone(&store)).deliver(&task).await;

        let delivered = store
            .list(&TaskFilter::new().with_delivery(crate::store::DeliveryStatus::Delivered))
            .unwrap();
        assert_eq!(delivered.len(), 1);
    }
}
