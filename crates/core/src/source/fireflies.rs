//! Fireflies GraphQL client with key failover, caching and fallbacks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};

use super::{SourceError, TranscriptSource};
use crate::cache::{CacheKey, CacheLookup, CacheManager};
use crate::config::FirefliesConfig;
use crate::resilience::{BreakerError, CircuitBreaker, KeyPool};
use crate::store::TranscriptStore;
use crate::transcript::RawTranscript;

const COMPREHENSIVE_QUERY: &str = r#"
query ListTranscripts($limit: Int!, $skip: Int!) {
  transcripts(limit: $limit, skip: $skip) {
    id
    title
    date
    duration
    organizer_email
    host_email
    summary {
      overview
      action_items
    }
    sentences {
      index
      speaker_name
      raw_text
      text
      start_time
    }
    meeting_attendees {
      displayName
      email
    }
  }
}
"#;

const BY_ID_QUERY: &str = r#"
query GetTranscript($id: String!) {
  transcript(id: $id) {
    id
    title
    date
    duration
    organizer_email
    host_email
    summary {
      overview
      action_items
    }
    sentences {
      index
      speaker_name
      raw_text
      text
      start_time
    }
    meeting_attendees {
      displayName
      email
    }
  }
}
"#;

const CONNECTION_QUERY: &str = "query { user { user_id email } }";

const CACHE_NAMESPACE: &str = "fireflies_comprehensive";
const TODAY_NAMESPACE: &str = "fireflies_today";
const TODAY_TTL: Duration = Duration::from_secs(3600);

/// What a GraphQL response body boiled down to.
enum QueryOutcome {
    Data(serde_json::Value),
    RateLimited { retry_after: Option<Duration> },
    Errors(String),
}

/// Multi-key Fireflies client.
///
/// Every query rotates through the key pool and runs under the `fireflies`
/// circuit breaker. Fetches prefer fresh cache, then the API, then stale
/// cache, then previously persisted rows.
pub struct FirefliesClient {
    http: reqwest::Client,
    base_url: String,
    keys: Arc<KeyPool>,
    breaker: Arc<CircuitBreaker>,
    cache: Arc<CacheManager>,
    store: Arc<dyn TranscriptStore>,
    page_size: u32,
    max_pages: u32,
    cache_ttl: Duration,
}

impl FirefliesClient {
    pub fn new(
        config: &FirefliesConfig,
        keys: Arc<KeyPool>,
        breaker: Arc<CircuitBreaker>,
        cache: Arc<CacheManager>,
        store: Arc<dyn TranscriptStore>,
    ) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            keys,
            breaker,
            cache,
            store,
            page_size: config.page_size,
            max_pages: config.max_pages,
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
        })
    }

    /// Classify a 200-level GraphQL body.
    fn classify_response(body: &serde_json::Value) -> QueryOutcome {
        let Some(errors) = body.get("errors").and_then(|e| e.as_array()) else {
            return QueryOutcome::Data(body.get("data").cloned().unwrap_or(json!(null)));
        };

        let messages: Vec<&str> = errors
            .iter()
            .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
            .collect();
        let rate_limited = messages
            .iter()
            .any(|m| m.to_lowercase().contains("too many requests"));
        if rate_limited {
            // retryAfter is an epoch-millisecond timestamp; floor at 60s.
            let retry_after = errors
                .iter()
                .filter_map(|e| {
                    e.get("extensions")
                        .and_then(|x| x.get("retryAfter"))
                        .and_then(|r| r.as_i64())
                })
                .map(|retry_at_ms| {
                    let secs = (retry_at_ms - Utc::now().timestamp_millis()) / 1000;
                    Duration::from_secs(secs.max(60) as u64)
                })
                .next();
            return QueryOutcome::RateLimited { retry_after };
        }
        QueryOutcome::Errors(messages.join("; "))
    }

    /// Run a query, rotating through the key pool on failures.
    async fn execute_query(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value, SourceError> {
        let attempts = self.keys.len().max(1);
        let payload = json!({ "query": query, "variables": variables });
        let mut last_error = "no keys configured".to_string();

        for attempt in 0..attempts {
            let Some((key_index, key)) = self.keys.acquire().await else {
                break;
            };

            let response = self
                .http
                .post(&self.base_url)
                .bearer_auth(&key)
                .json(&payload)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    warn!(attempt, error = %e, "transcript API request failed");
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 {
                warn!(attempt, key_index, "transcript API rate limited (HTTP 429)");
                self.keys.mark_unavailable(key_index, None);
                last_error = "HTTP 429 rate limited".to_string();
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!(attempt, status = status.as_u16(), "transcript API error response");
                last_error = format!("HTTP {}: {}", status.as_u16(), body);
                continue;
            }

            let body: serde_json::Value = match response.json().await {
                Ok(b) => b,
                Err(e) => {
                    last_error = format!("invalid response body: {}", e);
                    continue;
                }
            };

            match Self::classify_response(&body) {
                QueryOutcome::Data(data) => return Ok(data),
                QueryOutcome::RateLimited { retry_after } => {
                    warn!(key_index, "transcript API rate limited (GraphQL)");
                    self.keys.mark_unavailable(key_index, retry_after);
                    last_error = "GraphQL rate limited".to_string();
                }
                QueryOutcome::Errors(messages) => {
                    error!(errors = %messages, "transcript API query errors");
                    last_error = format!("query errors: {}", messages);
                }
            }
        }

        Err(SourceError::AllKeysExhausted(last_error))
    }

    async fn execute_guarded(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value, SourceError> {
        self.breaker
            .execute(|| self.execute_query(query, variables))
            .await
            .map_err(|e| match e {
                BreakerError::Open { name } => SourceError::CircuitOpen(name),
                BreakerError::Operation(e) => e,
            })
    }

    /// Walk pages until a short page, an empty page, or the page cap.
    async fn fetch_paginated(&self) -> Result<Vec<RawTranscript>, SourceError> {
        let mut all = Vec::new();
        for page in 0..self.max_pages {
            let skip = page * self.page_size;
            info!(page = page + 1, skip, "fetching transcript page");
            let data = self
                .execute_guarded(
                    COMPREHENSIVE_QUERY,
                    json!({ "limit": self.page_size, "skip": skip }),
                )
                .await?;

            let batch: Vec<RawTranscript> = data
                .get("transcripts")
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| SourceError::Query(format!("unexpected transcript shape: {}", e)))?
                .unwrap_or_default();

            let batch_len = batch.len();
            all.extend(batch);
            if batch_len < self.page_size as usize {
                break;
            }
        }
        info!(total = all.len(), "transcript pagination complete");
        Ok(all)
    }

    fn comprehensive_key() -> CacheKey {
        CacheKey::new(CACHE_NAMESPACE, "all_transcripts")
    }

    fn persist_transcripts(&self, transcripts: &[RawTranscript]) {
        let mut saved = 0;
        for raw in transcripts {
            match self.store.upsert(raw) {
                Ok(_) => saved += 1,
                Err(e) => warn!(transcript = %raw.id, error = %e, "failed to persist transcript"),
            }
        }
        info!(saved, "transcripts persisted");
    }

    /// Previously persisted rows, used when both API and cache fail.
    fn transcripts_from_store(&self) -> Vec<RawTranscript> {
        let rows = match self.store.list_recent(100) {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "store fallback failed");
                return Vec::new();
            }
        };
        rows.into_iter()
            .filter_map(|row| serde_json::from_value(row.raw_payload).ok())
            .collect()
    }

    fn filter_today(transcripts: &[RawTranscript]) -> Vec<RawTranscript> {
        let today = Utc::now().date_naive();
        transcripts
            .iter()
            .filter(|t| t.meeting_date().map(|d| d.date_naive()) == Some(today))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TranscriptSource for FirefliesClient {
    async fn fetch_comprehensive(
        &self,
        force_refresh: bool,
    ) -> Result<Vec<RawTranscript>, SourceError> {
        let key = Self::comprehensive_key();
        let lookup = self.cache.lookup::<Vec<RawTranscript>>(&key).await;

        if !force_refresh {
            if let CacheLookup::Fresh(cached) = &lookup {
                info!(count = cached.len(), "serving transcripts from cache");
                return Ok(cached.clone());
            }
        }

        match self.fetch_paginated().await {
            Ok(transcripts) => {
                if !transcripts.is_empty() {
                    self.cache
                        .store_with_ttl(&key, &transcripts, self.cache_ttl)
                        .await;
                    self.persist_transcripts(&transcripts);
                }
                Ok(transcripts)
            }
            Err(e) => {
                warn!(error = %e, "transcript fetch failed, trying fallbacks");
                if let CacheLookup::Stale(cached) = lookup {
                    warn!(count = cached.len(), "serving stale cached transcripts");
                    return Ok(cached);
                }
                let persisted = self.transcripts_from_store();
                if !persisted.is_empty() {
                    warn!(count = persisted.len(), "serving persisted transcripts");
                    return Ok(persisted);
                }
                Err(e)
            }
        }
    }

    async fn fetch_today(&self) -> Result<Vec<RawTranscript>, SourceError> {
        let today = Utc::now().date_naive().to_string();
        let key = CacheKey::new(TODAY_NAMESPACE, &today);

        if let CacheLookup::Fresh(cached) = self.cache.lookup::<Vec<RawTranscript>>(&key).await {
            info!(count = cached.len(), "serving today's transcripts from cache");
            return Ok(cached);
        }

        let all = self.fetch_comprehensive(false).await?;
        let todays = Self::filter_today(&all);
        self.cache.store_with_ttl(&key, &todays, TODAY_TTL).await;
        Ok(todays)
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<RawTranscript>, SourceError> {
        let data = self
            .execute_guarded(BY_ID_QUERY, json!({ "id": id }))
            .await?;
        let transcript = data.get("transcript").cloned().filter(|t| !t.is_null());
        let Some(value) = transcript else {
            return Ok(None);
        };
        let raw: RawTranscript = serde_json::from_value(value)
            .map_err(|e| SourceError::Query(format!("unexpected transcript shape: {}", e)))?;
        self.persist_transcripts(std::slice::from_ref(&raw));
        Ok(Some(raw))
    }

    async fn test_connection(&self) -> bool {
        match self.execute_guarded(CONNECTION_QUERY, json!({})).await {
            Ok(data) => data.get("user").map(|u| !u.is_null()).unwrap_or(false),
            Err(e) => {
                error!(error = %e, "transcript API connection test failed");
                false
            }
        }
    }
}
