//! Transcript source: the upstream meeting-recording API.

mod fireflies;

pub use fireflies::FirefliesClient;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::resilience::Transient;
use crate::transcript::RawTranscript;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("query error: {0}")]
    Query(String),

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("all credentials exhausted, last error: {0}")]
    AllKeysExhausted(String),

    #[error("circuit breaker '{0}' is open")]
    CircuitOpen(String),

    #[error("no transcript data available from upstream or fallbacks")]
    NoData,
}

impl Transient for SourceError {
    fn is_transient(&self) -> bool {
        match self {
            SourceError::Transport(_) | SourceError::RateLimited { .. } => true,
            SourceError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Abstract transcript source so the pipeline can run against mocks.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// All transcripts visible to the account, freshest cache permitting.
    async fn fetch_comprehensive(
        &self,
        force_refresh: bool,
    ) -> Result<Vec<RawTranscript>, SourceError>;

    /// Transcripts whose meeting falls on the current UTC date.
    async fn fetch_today(&self) -> Result<Vec<RawTranscript>, SourceError>;

    /// Single transcript by upstream id.
    async fn fetch_by_id(&self, id: &str) -> Result<Option<RawTranscript>, SourceError>;

    /// Cheap credential probe.
    async fn test_connection(&self) -> bool;
}
