//! Raw transcript data model as returned by the transcript source API.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One meeting transcript as fetched upstream.
///
/// Timestamps come over the wire as epoch milliseconds; `duration` is also
/// in milliseconds. Unknown fields are ignored so upstream schema additions
/// do not break ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTranscript {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Meeting start, epoch milliseconds.
    #[serde(default)]
    pub date: Option<i64>,
    /// Meeting length, milliseconds.
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub organizer_email: Option<String>,
    #[serde(default)]
    pub host_email: Option<String>,
    #[serde(default)]
    pub summary: Option<TranscriptSummary>,
    #[serde(default)]
    pub sentences: Vec<Sentence>,
    #[serde(default)]
    pub meeting_attendees: Vec<Attendee>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptSummary {
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub action_items: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentence {
    #[serde(default)]
    pub index: Option<i64>,
    #[serde(default)]
    pub speaker_name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub start_time: Option<f64>,
}

impl Sentence {
    /// Cleaned text with the raw ASR text as fallback.
    pub fn spoken_text(&self) -> &str {
        self.text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.raw_text.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attendee {
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl RawTranscript {
    /// Meeting start as a UTC timestamp, when the upstream supplied one.
    pub fn meeting_date(&self) -> Option<DateTime<Utc>> {
        self.date
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled Meeting")
    }

    /// Speaker-prefixed dialogue, one sentence per line.
    pub fn content_text(&self) -> String {
        let mut lines = Vec::with_capacity(self.sentences.len());
        for sentence in &self.sentences {
            let text = sentence.spoken_text();
            if text.is_empty() {
                continue;
            }
            let speaker = sentence.speaker_name.as_deref().unwrap_or("Unknown");
            lines.push(format!("{}: {}", speaker, text));
        }
        lines.join("\n")
    }

    /// Attendee count, falling back to distinct speakers when the upstream
    /// sent no attendee list.
    pub fn participant_count(&self) -> u32 {
        if !self.meeting_attendees.is_empty() {
            return self.meeting_attendees.len() as u32;
        }
        let mut speakers: Vec<&str> = self
            .sentences
            .iter()
            .filter_map(|s| s.speaker_name.as_deref())
            .collect();
        speakers.sort();
        speakers.dedup();
        speakers.len() as u32
    }

    pub fn duration_minutes(&self) -> u32 {
        self.duration.map(|ms| (ms / 60_000).max(0) as u32).unwrap_or(0)
    }
}
