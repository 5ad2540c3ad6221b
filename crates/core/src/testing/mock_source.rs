//! Mock transcript source for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::source::{SourceError, TranscriptSource};
use crate::transcript::RawTranscript;

/// Mock implementation of [`TranscriptSource`].
///
/// Serves a configured set of transcripts and can be primed with errors.
pub struct MockTranscriptSource {
    transcripts: Arc<RwLock<Vec<RawTranscript>>>,
    errors: Arc<RwLock<VecDeque<SourceError>>>,
    fetches: AtomicUsize,
}

impl Default for MockTranscriptSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTranscriptSource {
    pub fn new() -> Self {
        Self {
            transcripts: Arc::new(RwLock::new(Vec::new())),
            errors: Arc::new(RwLock::new(VecDeque::new())),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_transcripts(transcripts: Vec<RawTranscript>) -> Self {
        Self {
            transcripts: Arc::new(RwLock::new(transcripts)),
            ..Self::new()
        }
    }

    pub async fn set_transcripts(&self, transcripts: Vec<RawTranscript>) {
        *self.transcripts.write().await = transcripts;
    }

    /// Queue an error consumed by the next fetch call.
    pub async fn fail_next(&self, error: SourceError) {
        self.errors.write().await.push_back(error);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    async fn take_error(&self) -> Option<SourceError> {
        self.errors.write().await.pop_front()
    }
}

#[async_trait]
impl TranscriptSource for MockTranscriptSource {
    async fn fetch_comprehensive(
        &self,
        _force_refresh: bool,
    ) -> Result<Vec<RawTranscript>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        Ok(self.transcripts.read().await.clone())
    }

    async fn fetch_today(&self) -> Result<Vec<RawTranscript>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        let today = Utc::now().date_naive();
        Ok(self
            .transcripts
            .read()
            .await
            .iter()
            .filter(|t| t.meeting_date().map(|d| d.date_naive()) == Some(today))
            .cloned()
            .collect())
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<RawTranscript>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        Ok(self
            .transcripts
            .read()
            .await
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn test_connection(&self) -> bool {
        true
    }
}
