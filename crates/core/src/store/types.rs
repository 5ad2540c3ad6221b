use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::transcript::RawTranscript;

/// Task priority, mirroring the work board's three labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }

    /// Parse a board label, falling back to Medium on anything unexpected.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Low" => Priority::Low,
            "High" => Priority::High,
            _ => Priority::Medium,
        }
    }
}

/// Task workflow status, mirroring the work board's status column labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    ToDo,
    Stuck,
    WorkingOnIt,
    WaitingForReview,
    Approved,
    Done,
}

impl TaskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::ToDo => "To Do",
            TaskStatus::Stuck => "Stuck",
            TaskStatus::WorkingOnIt => "Working on it",
            TaskStatus::WaitingForReview => "Waiting for review",
            TaskStatus::Approved => "Approved",
            TaskStatus::Done => "Done",
        }
    }

    /// Parse a board label, falling back to To Do on anything unexpected.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Stuck" => TaskStatus::Stuck,
            "Working on it" => TaskStatus::WorkingOnIt,
            "Waiting for review" => TaskStatus::WaitingForReview,
            "Approved" => TaskStatus::Approved,
            "Done" => TaskStatus::Done,
            _ => TaskStatus::ToDo,
        }
    }
}

/// Human review verdict on an extracted task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Delivered,
    Failed,
}

/// One failed delivery attempt. The list is append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryError {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Delivery state embedded in each task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub status: DeliveryStatus,
    pub remote_item_id: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub errors: Vec<DeliveryError>,
}

/// A transcript persisted after ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedTranscript {
    pub id: String,
    /// Upstream transcript id; unique, ingestion is idempotent on it.
    pub external_id: String,
    pub meeting_title: String,
    pub meeting_date: Option<DateTime<Utc>>,
    pub participant_count: u32,
    pub duration_minutes: u32,
    pub raw_payload: serde_json::Value,
    /// sha256 of the canonical raw payload.
    pub content_hash: String,
    pub processed: bool,
    pub is_valid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Hash of the canonical JSON encoding of a payload.
pub(crate) fn content_hash(payload: &serde_json::Value) -> String {
    let canonical = payload.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{:x}", digest)
}

impl CachedTranscript {
    /// Build a row from a raw upstream transcript.
    pub fn from_raw(raw: &RawTranscript) -> Self {
        let payload = serde_json::to_value(raw).unwrap_or(serde_json::Value::Null);
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            external_id: raw.id.clone(),
            meeting_title: raw.display_title().to_string(),
            meeting_date: raw.meeting_date(),
            participant_count: raw.participant_count(),
            duration_minutes: raw.duration_minutes(),
            content_hash: content_hash(&payload),
            raw_payload: payload,
            processed: false,
            is_valid: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An extracted task before it gets persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub task_item: String,
    pub assignee_emails: Vec<String>,
    pub assignee_names: Vec<String>,
    pub priority: Priority,
    pub brief_description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    /// Whether the task text reached the minimum word count on its own.
    pub meets_word_count: bool,
    /// Whether the brief description landed in the target word range.
    pub meets_description_length: bool,
    /// Position of the item in the extraction output.
    pub extraction_order: u32,
    pub confidence: f64,
    /// Transcript sentences most likely backing this task.
    pub source_sentences: Vec<String>,
}

/// A persisted task, including review and delivery state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedTask {
    pub id: String,
    pub transcript_external_id: String,
    pub task_item: String,
    pub assignee_emails: Vec<String>,
    pub assignee_names: Vec<String>,
    pub priority: Priority,
    pub brief_description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub meets_word_count: bool,
    pub meets_description_length: bool,
    pub extraction_order: u32,
    pub confidence: f64,
    pub source_sentences: Vec<String>,
    pub approval_status: ApprovalStatus,
    /// When set, the task may be delivered without an explicit trigger.
    pub auto_push_enabled: bool,
    pub reviewer: Option<String>,
    pub review_notes: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub delivery: DeliveryRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExtractedTask {
    /// A task is deliverable once approved and not yet sent.
    pub fn is_deliverable(&self) -> bool {
        self.approval_status == ApprovalStatus::Approved
            && self.delivery.status != DeliveryStatus::Delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_labels_round_trip() {
        for p in [Priority::Low, Priority::Medium, Priority::High] {
            assert_eq!(Priority::from_label(p.label()), p);
        }
    }

    #[test]
    fn test_unknown_priority_clamps_to_medium() {
        assert_eq!(Priority::from_label("Urgent"), Priority::Medium);
        assert_eq!(Priority::from_label(""), Priority::Medium);
    }

    #[test]
    fn test_status_labels_round_trip() {
        for s in [
            TaskStatus::ToDo,
            TaskStatus::Stuck,
            TaskStatus::WorkingOnIt,
            TaskStatus::WaitingForReview,
            TaskStatus::Approved,
            TaskStatus::Done,
        ] {
            assert_eq!(TaskStatus::from_label(s.label()), s);
        }
    }

    #[test]
    fn test_unknown_status_clamps_to_todo() {
        assert_eq!(TaskStatus::from_label("Blocked"), TaskStatus::ToDo);
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = serde_json::json!({"b": 2, "a": 1});
        let b = serde_json::json!({"a": 1, "b": 2});
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_eq!(content_hash(&a).len(), 64);
    }

    #[test]
    fn test_from_raw_populates_metadata() {
        let raw: RawTranscript = serde_json::from_value(serde_json::json!({
            "id": "t-9",
            "title": "Standup",
            "date": 1750057200000i64,
            "duration": 900000,
            "meeting_attendees": [{"displayName": "A", "email": "a@x.com"}]
        }))
        .unwrap();
        let cached = CachedTranscript::from_raw(&raw);
        assert_eq!(cached.external_id, "t-9");
        assert_eq!(cached.meeting_title, "Standup");
        assert_eq!(cached.duration_minutes, 15);
        assert_eq!(cached.participant_count, 1);
        assert!(!cached.processed);
        assert!(cached.is_valid);
    }
}
