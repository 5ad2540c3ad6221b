use std::sync::Arc;

use tokio::sync::mpsc;

use super::{AuditEventEnvelope, AuditHandle, AuditRecord, AuditStore};

/// Background task that receives audit events and writes them to storage.
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditEventEnvelope>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    pub fn new(rx: mpsc::Receiver<AuditEventEnvelope>, store: Arc<dyn AuditStore>) -> Self {
        Self { rx, store }
    }

    /// Consume events until every handle has been dropped. Spawn this with
    /// `tokio::spawn(writer.run())`.
    pub async fn run(mut self) {
        tracing::info!("audit writer started");

        while let Some(envelope) = self.rx.recv().await {
            let record = AuditRecord {
                id: 0,
                timestamp: envelope.timestamp,
                event_type: envelope.event.event_type().to_string(),
                transcript_id: envelope.event.transcript_id().map(String::from),
                task_id: envelope.event.task_id().map(String::from),
                data: envelope.event,
            };
            if let Err(e) = self.store.insert(&record) {
                tracing::error!(error = %e, "failed to write audit event");
            }
        }

        tracing::info!("audit writer shutting down");
    }
}

/// Wire up an emit handle and its writer over a bounded channel.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    buffer_size: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (AuditHandle::new(tx), AuditWriter::new(rx, store))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::audit::{AuditError, AuditEvent, AuditFilter};

    struct MockStore {
        records: Mutex<Vec<AuditRecord>>,
        should_fail: bool,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                should_fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                should_fail: true,
            }
        }

        fn get_records(&self) -> Vec<AuditRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    impl AuditStore for MockStore {
        fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
            if self.should_fail {
                return Err(AuditError::Database("mock failure".to_string()));
            }
            let mut records = self.records.lock().unwrap();
            let id = records.len() as i64 + 1;
            let mut stored = record.clone();
            stored.id = id;
            records.push(stored);
            Ok(id)
        }

        fn query(&self, _filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
            Ok(self.records.lock().unwrap().clone())
        }

        fn count(&self, _filter: &AuditFilter) -> Result<i64, AuditError> {
            Ok(self.records.lock().unwrap().len() as i64)
        }
    }

    #[tokio::test]
    async fn test_writer_stores_events_with_lookup_keys() {
        let store = Arc::new(MockStore::new());
        let (handle, writer) = create_audit_system(Arc::clone(&store) as _, 10);
        let writer_handle = tokio::spawn(writer.run());

        handle
            .emit(AuditEvent::TaskApproved {
                task_id: "task-1".to_string(),
                transcript_id: "t-1".to_string(),
                reviewer: "alice".to_string(),
            })
            .await;
        drop(handle);
        writer_handle.await.unwrap();

        let records = store.get_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "task_approved");
        assert_eq!(records[0].transcript_id.as_deref(), Some("t-1"));
        assert_eq!(records[0].task_id.as_deref(), Some("task-1"));
    }

    #[tokio::test]
    async fn test_writer_continues_on_insert_failure() {
        let store = Arc::new(MockStore::failing());
        let (handle, writer) = create_audit_system(store as _, 10);
        let writer_handle = tokio::spawn(writer.run());

        handle
            .emit(AuditEvent::ServiceStarted {
                version: "0.1.0".to_string(),
            })
            .await;
        drop(handle);

        writer_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_waits_for_all_handles() {
        let store = Arc::new(MockStore::new());
        let (main_handle, writer) = create_audit_system(Arc::clone(&store) as _, 10);
        let pipeline_handle = main_handle.clone();

        let writer_handle = tokio::spawn(writer.run());

        pipeline_handle
            .emit(AuditEvent::ServiceStarted {
                version: "0.1.0".to_string(),
            })
            .await;
        main_handle
            .emit(AuditEvent::ServiceStopped {
                reason: "graceful_shutdown".to_string(),
            })
            .await;

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        drop(main_handle);
        assert!(!writer_handle.is_finished());

        drop(pipeline_handle);
        tokio::time::timeout(tokio::time::Duration::from_secs(1), writer_handle)
            .await
            .expect("writer should exit once all handles drop")
            .unwrap();

        assert_eq!(store.get_records().len(), 2);
    }
}
