//! Mock work item sink for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::delivery::{SinkError, WorkItemSink};
use crate::store::ExtractedTask;

/// Mock implementation of [`WorkItemSink`].
///
/// Assigns sequential remote ids, records every delivered task and can be
/// primed with errors for failure-path tests.
pub struct MockWorkItemSink {
    delivered: Arc<RwLock<Vec<ExtractedTask>>>,
    errors: Arc<RwLock<VecDeque<SinkError>>>,
    calls: AtomicUsize,
}

impl Default for MockWorkItemSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWorkItemSink {
    pub fn new() -> Self {
        Self {
            delivered: Arc::new(RwLock::new(Vec::new())),
            errors: Arc::new(RwLock::new(VecDeque::new())),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue an error consumed by the next `create_item` call.
    pub async fn fail_next(&self, error: SinkError) {
        self.errors.write().await.push_back(error);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Tasks successfully delivered so far.
    pub async fn delivered_tasks(&self) -> Vec<ExtractedTask> {
        self.delivered.read().await.clone()
    }
}

#[async_trait]
impl WorkItemSink for MockWorkItemSink {
    async fn create_item(&self, task: &ExtractedTask) -> Result<String, SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.errors.write().await.pop_front() {
            return Err(error);
        }
        let mut delivered = self.delivered.write().await;
        delivered.push(task.clone());
        Ok(format!("item-{}", delivered.len()))
    }

    async fn test_connection(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DeliveryRecord, ExtractedTask};
    use chrono::Utc;

    fn task(id: &str) -> ExtractedTask {
        ExtractedTask {
            id: id.into(),
            transcript_external_id: "t-1".into(),
            task_item: "Draft the proposal".into(),
            assignee_emails: vec![],
            assignee_names: vec![],
            priority: Default::default(),
            brief_description: String::new(),
            due_date: None,
            status: Default::default(),
            meets_word_count: false,
            meets_description_length: false,
            extraction_order: 0,
            confidence: 0.9,
            source_sentences: vec![],
            approval_status: Default::default(),
            auto_push_enabled: false,
            reviewer: None,
            review_notes: None,
            reviewed_at: None,
            delivery: DeliveryRecord::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_sequential_ids_and_recording() {
        let sink = MockWorkItemSink::new();
        assert_eq!(sink.create_item(&task("a")).await.unwrap(), "item-1");
        assert_eq!(sink.create_item(&task("b")).await.unwrap(), "item-2");
        assert_eq!(sink.call_count(), 2);
        assert_eq!(sink.delivered_tasks().await.len(), 2);
    }

    #[tokio::test]
    async fn test_error_injection_is_consumed() {
        let sink = MockWorkItemSink::new();
        sink.fail_next(SinkError::Transport("reset".into())).await;
        assert!(sink.create_item(&task("a")).await.is_err());
        assert!(sink.create_item(&task("a")).await.is_ok());
    }
}
