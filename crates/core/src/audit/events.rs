use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit events covering every state-changing operation in the pipeline.
///
/// Events are emitted explicitly by the code that performed the change,
/// right after the change is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A transcript was fetched and stored.
    TranscriptCached {
        transcript_id: String,
        title: String,
        meeting_date: Option<DateTime<Utc>>,
    },

    /// Extraction finished for one transcript.
    ExtractionCompleted {
        transcript_id: String,
        tasks_extracted: usize,
    },

    TaskApproved {
        task_id: String,
        transcript_id: String,
        reviewer: String,
    },

    TaskRejected {
        task_id: String,
        transcript_id: String,
        reviewer: String,
    },

    TaskDelivered {
        task_id: String,
        transcript_id: String,
        remote_item_id: String,
    },

    DeliveryFailed {
        task_id: String,
        transcript_id: String,
        error: String,
    },

    /// A pipeline run finished, in any terminal stage.
    RunCompleted {
        run_id: String,
        stage: String,
        transcripts_processed: usize,
        tasks_extracted: usize,
        tasks_delivered: usize,
        errors: usize,
    },

    ServiceStarted {
        version: String,
    },

    ServiceStopped {
        reason: String,
    },
}

impl AuditEvent {
    /// Stable snake_case name, also used as the store's event_type column.
    pub fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::TranscriptCached { .. } => "transcript_cached",
            AuditEvent::ExtractionCompleted { .. } => "extraction_completed",
            AuditEvent::TaskApproved { .. } => "task_approved",
            AuditEvent::TaskRejected { .. } => "task_rejected",
            AuditEvent::TaskDelivered { .. } => "task_delivered",
            AuditEvent::DeliveryFailed { .. } => "delivery_failed",
            AuditEvent::RunCompleted { .. } => "run_completed",
            AuditEvent::ServiceStarted { .. } => "service_started",
            AuditEvent::ServiceStopped { .. } => "service_stopped",
        }
    }

    /// Transcript this event concerns, if any.
    pub fn transcript_id(&self) -> Option<&str> {
        match self {
            AuditEvent::TranscriptCached { transcript_id, .. }
            | AuditEvent::ExtractionCompleted { transcript_id, .. }
            | AuditEvent::TaskApproved { transcript_id, .. }
            | AuditEvent::TaskRejected { transcript_id, .. }
            | AuditEvent::TaskDelivered { transcript_id, .. }
            | AuditEvent::DeliveryFailed { transcript_id, .. } => Some(transcript_id),
            _ => None,
        }
    }

    /// Task this event concerns, if any.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            AuditEvent::TaskApproved { task_id, .. }
            | AuditEvent::TaskRejected { task_id, .. }
            | AuditEvent::TaskDelivered { task_id, .. }
            | AuditEvent::DeliveryFailed { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

/// A stored audit event with its database id and denormalized lookup keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub transcript_id: Option<String>,
    pub task_id: Option<String>,
    pub data: AuditEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let event = AuditEvent::TaskDelivered {
            task_id: "task-1".into(),
            transcript_id: "t-1".into(),
            remote_item_id: "item-9".into(),
        };
        assert_eq!(event.event_type(), "task_delivered");
        assert_eq!(event.transcript_id(), Some("t-1"));
        assert_eq!(event.task_id(), Some("task-1"));
    }

    #[test]
    fn test_run_completed_carries_no_entity_ids() {
        let event = AuditEvent::RunCompleted {
            run_id: "r-1".into(),
            stage: "completed".into(),
            transcripts_processed: 2,
            tasks_extracted: 5,
            tasks_delivered: 0,
            errors: 0,
        };
        assert!(event.transcript_id().is_none());
        assert!(event.task_id().is_none());
    }

    #[test]
    fn test_events_round_trip_through_json() {
        let event = AuditEvent::ExtractionCompleted {
            transcript_id: "t-1".into(),
            tasks_extracted: 3,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"extraction_completed\""));
        let back: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "extraction_completed");
    }
}
