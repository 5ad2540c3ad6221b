//! Store traits separating pipeline logic from the sqlite implementation.

use chrono::NaiveDate;

use super::types::{ApprovalStatus, CachedTranscript, DeliveryStatus, ExtractedTask, NewTask};
use super::StoreError;
use crate::transcript::RawTranscript;

/// Filter for task listings.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub approval_status: Option<ApprovalStatus>,
    pub delivery_status: Option<DeliveryStatus>,
    pub transcript_external_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_approval(mut self, status: ApprovalStatus) -> Self {
        self.approval_status = Some(status);
        self
    }

    pub fn with_delivery(mut self, status: DeliveryStatus) -> Self {
        self.delivery_status = Some(status);
        self
    }

    pub fn with_transcript(mut self, external_id: impl Into<String>) -> Self {
        self.transcript_external_id = Some(external_id.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Persisted transcripts, keyed by their upstream id.
pub trait TranscriptStore: Send + Sync {
    /// Insert the transcript if its external id is new; otherwise return the
    /// existing row untouched. The first stored raw payload wins.
    fn upsert(&self, raw: &RawTranscript) -> Result<CachedTranscript, StoreError>;

    fn get(&self, external_id: &str) -> Result<Option<CachedTranscript>, StoreError>;

    /// Transcripts not yet run through extraction, oldest meeting first.
    fn list_unprocessed(&self, limit: u32) -> Result<Vec<CachedTranscript>, StoreError>;

    /// Transcripts whose meeting falls on the given UTC date.
    fn list_by_date(&self, date: NaiveDate) -> Result<Vec<CachedTranscript>, StoreError>;

    /// Most recent transcripts by meeting date.
    fn list_recent(&self, limit: u32) -> Result<Vec<CachedTranscript>, StoreError>;

    fn mark_processed(&self, external_id: &str) -> Result<(), StoreError>;

    fn count(&self) -> Result<i64, StoreError>;
}

/// Extracted tasks, their review state and delivery records.
pub trait TaskStore: Send + Sync {
    /// Persist a batch of freshly extracted tasks for one transcript.
    ///
    /// Fails with [`StoreError::AlreadyExtracted`] when the transcript
    /// already has tasks, unless `force` is set, in which case the old
    /// tasks are replaced.
    fn insert_tasks(
        &self,
        transcript_external_id: &str,
        tasks: Vec<NewTask>,
        force: bool,
    ) -> Result<Vec<ExtractedTask>, StoreError>;

    fn get_task(&self, id: &str) -> Result<Option<ExtractedTask>, StoreError>;

    fn list(&self, filter: &TaskFilter) -> Result<Vec<ExtractedTask>, StoreError>;

    fn approve(
        &self,
        id: &str,
        reviewer: &str,
        notes: Option<String>,
    ) -> Result<ExtractedTask, StoreError>;

    fn reject(
        &self,
        id: &str,
        reviewer: &str,
        notes: Option<String>,
    ) -> Result<ExtractedTask, StoreError>;

    fn record_delivery_success(
        &self,
        id: &str,
        remote_item_id: &str,
    ) -> Result<ExtractedTask, StoreError>;

    /// Append a delivery error and mark the task failed.
    fn record_delivery_failure(&self, id: &str, message: &str)
        -> Result<ExtractedTask, StoreError>;

    fn count(&self, filter: &TaskFilter) -> Result<i64, StoreError>;
}
