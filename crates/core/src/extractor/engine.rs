//! Extraction engine: prompt to validated tasks.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::due_date::{clamp_due_date, derive_due_date};
use super::llm::{LlmClient, LlmError};
use super::parse::{parse_llm_output, split_list, RawTaskRecord};
use super::prompt::PromptTemplate;
use crate::cache::{CacheKey, CacheLookup, CacheManager};
use crate::store::{NewTask, Priority, TaskStatus};
use crate::transcript::{RawTranscript, Sentence};

const PROMPT_CACHE_NAMESPACE: &str = "llm_extraction";
const MIN_TASK_WORDS: usize = 10;
const BRIEF_MIN_WORDS: usize = 30;
const BRIEF_MAX_WORDS: usize = 50;
const SOURCE_SENTENCE_LIMIT: usize = 3;
const EXTRACTION_CONFIDENCE: f64 = 0.9;

/// Drives one transcript through prompt rendering, the LLM and output
/// normalization.
///
/// Unparsable output and invalid records collapse to an empty batch;
/// only an unreachable model surfaces as an error.
pub struct ExtractionEngine {
    llm: Arc<dyn LlmClient>,
    template: PromptTemplate,
    cache: Arc<CacheManager>,
    prompt_cache_ttl: Duration,
}

impl ExtractionEngine {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        template: PromptTemplate,
        cache: Arc<CacheManager>,
        prompt_cache_ttl: Duration,
    ) -> Self {
        Self {
            llm,
            template,
            cache,
            prompt_cache_ttl,
        }
    }

    /// Extract normalized tasks from one transcript.
    ///
    /// Unparsable or invalid model output degrades to an empty batch; only
    /// the LLM call itself can fail here.
    pub async fn extract(&self, transcript: &RawTranscript) -> Result<Vec<NewTask>, LlmError> {
        let prompt = self.template.render(transcript);
        let prompt_hash = format!("{:x}", Sha256::digest(prompt.as_bytes()));
        let cache_key = CacheKey::new(PROMPT_CACHE_NAMESPACE, &prompt_hash);

        let output = match self.cache.lookup::<String>(&cache_key).await {
            CacheLookup::Fresh(cached) => {
                info!(transcript = %transcript.id, "using cached extraction output");
                cached
            }
            _ => {
                let output = self.llm.generate(&prompt).await.map_err(|e| {
                    warn!(transcript = %transcript.id, error = %e, "extraction call failed");
                    e
                })?;
                self.cache
                    .store_with_ttl(&cache_key, &output, self.prompt_cache_ttl)
                    .await;
                output
            }
        };

        let records = parse_llm_output(&output);
        info!(
            transcript = %transcript.id,
            records = records.len(),
            "parsed extraction output"
        );

        let mut tasks = Vec::new();
        let mut seen_titles: Vec<String> = Vec::new();
        for record in records {
            let task = self.normalize(record, transcript, tasks.len() as u32);
            let normalized_title = normalize_title(&task.task_item);
            if seen_titles.contains(&normalized_title) {
                continue;
            }
            seen_titles.push(normalized_title);
            tasks.push(task);
        }
        Ok(tasks)
    }

    /// Apply the output contract to one record: word counts are recomputed
    /// here rather than trusted from the model, enums are clamped to safe
    /// defaults, and due dates are re-derived and bounded.
    fn normalize(
        &self,
        record: RawTaskRecord,
        transcript: &RawTranscript,
        extraction_order: u32,
    ) -> NewTask {
        let sources = find_source_sentences(&record.task_item, &transcript.sentences);

        let mut task_item = record.task_item.trim().to_string();
        if word_count(&task_item) < MIN_TASK_WORDS {
            task_item = pad_with_sources(&task_item, &sources);
        }
        let meets_word_count = word_count(&task_item) >= MIN_TASK_WORDS;

        let brief_description = record
            .brief_description
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_string();
        let brief_words = word_count(&brief_description);
        let meets_description_length =
            (BRIEF_MIN_WORDS..=BRIEF_MAX_WORDS).contains(&brief_words);

        let priority = Priority::from_label(record.priority.as_deref().unwrap_or(""));
        let status = TaskStatus::from_label(record.status.as_deref().unwrap_or(""));

        let temporal_text = format!("{} {}", task_item, brief_description);
        let due_date = match (record.due_date_millis(), transcript.meeting_date()) {
            (Some(ms), Some(meeting)) => chrono::DateTime::from_timestamp_millis(ms)
                .map(|candidate| clamp_due_date(candidate, meeting, &temporal_text))
                .or_else(|| derive_due_date(&temporal_text, meeting)),
            (None, Some(meeting)) => derive_due_date(&temporal_text, meeting),
            // No meeting anchor, trust the model or leave it unset.
            (Some(ms), None) => chrono::DateTime::from_timestamp_millis(ms),
            (None, None) => None,
        };

        NewTask {
            task_item,
            assignee_emails: split_list(record.assignee_emails.as_deref().unwrap_or("")),
            assignee_names: split_list(record.assignee_full_names.as_deref().unwrap_or("")),
            priority,
            brief_description,
            due_date,
            status,
            meets_word_count,
            meets_description_length,
            extraction_order,
            confidence: EXTRACTION_CONFIDENCE,
            source_sentences: sources,
        }
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn normalize_title(title: &str) -> String {
    title.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Transcript sentences most likely backing the task: at least two words in
/// common, ranked by overlap, top three.
fn find_source_sentences(task_item: &str, sentences: &[Sentence]) -> Vec<String> {
    let task_words: Vec<String> = task_item
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let mut scored: Vec<(usize, String)> = sentences
        .iter()
        .filter_map(|sentence| {
            let text = sentence.spoken_text();
            if text.is_empty() {
                return None;
            }
            let lowered = text.to_lowercase();
            let sentence_words: Vec<&str> = lowered.split_whitespace().collect();
            let mut overlap = 0;
            for word in &task_words {
                if sentence_words.contains(&word.as_str()) {
                    overlap += 1;
                }
            }
            (overlap >= 2).then(|| (overlap, text.to_string()))
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(SOURCE_SENTENCE_LIMIT)
        .map(|(_, text)| text)
        .collect()
}

/// Extend a short task item with its source sentences until the minimum
/// word count is met. Context only, never filler words.
fn pad_with_sources(task_item: &str, sources: &[String]) -> String {
    let mut padded = task_item.trim_end_matches('.').to_string();
    for source in sources {
        if word_count(&padded) >= MIN_TASK_WORDS {
            break;
        }
        padded.push_str(" - ");
        padded.push_str(source.trim());
    }
    padded
}
