//! Delivery of approved tasks to the downstream work tracker.

mod monday;
mod service;

pub use monday::MondayClient;
pub use service::DeliveryService;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::resilience::Transient;
use crate::store::ExtractedTask;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("sink returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("GraphQL errors: {0}")]
    Graphql(String),

    #[error("sink returned no item id")]
    MissingItemId,

    #[error("circuit breaker '{0}' is open")]
    CircuitOpen(String),
}

impl Transient for SinkError {
    fn is_transient(&self) -> bool {
        match self {
            SinkError::Transport(_) => true,
            SinkError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Where approved tasks end up. Mocked in tests.
#[async_trait]
pub trait WorkItemSink: Send + Sync {
    /// Create one remote work item and return its id.
    async fn create_item(&self, task: &ExtractedTask) -> Result<String, SinkError>;

    async fn test_connection(&self) -> bool;
}

/// Per-task result of a delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered {
        task_id: String,
        remote_item_id: String,
    },
    /// The task already carries a remote id; nothing was sent.
    AlreadyDelivered {
        task_id: String,
        remote_item_id: String,
    },
    /// Precondition not met, for example the task is not approved.
    Skipped { task_id: String, reason: String },
    Failed { task_id: String, error: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(
            self,
            DeliveryOutcome::Delivered { .. } | DeliveryOutcome::AlreadyDelivered { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SinkError::Transport("reset".into()).is_transient());
        assert!(SinkError::Api { status: 502, body: String::new() }.is_transient());
        assert!(SinkError::Api { status: 429, body: String::new() }.is_transient());
        assert!(!SinkError::Api { status: 401, body: String::new() }.is_transient());
        assert!(!SinkError::Graphql("bad column".into()).is_transient());
        assert!(!SinkError::MissingItemId.is_transient());
    }
}
