//! Persistence layer: cached transcripts, extracted tasks, review state
//! and delivery records.

mod sqlite;
mod traits;
mod types;

pub use sqlite::SqliteStore;
pub use traits::{TaskFilter, TaskStore, TranscriptStore};
pub use types::{
    ApprovalStatus, CachedTranscript, DeliveryError, DeliveryRecord, DeliveryStatus,
    ExtractedTask, NewTask, Priority, TaskStatus,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transcript {0} already has extracted tasks")]
    AlreadyExtracted(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}
