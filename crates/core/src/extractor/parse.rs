//! Defensive parsing of LLM extraction output.
//!
//! The model is instructed to return a bare JSON array, but real responses
//! arrive fenced, as a single object, or malformed. Anything unusable
//! degrades to an empty batch rather than an error.

use serde::Deserialize;
use tracing::warn;

/// One task object as emitted by the model, before normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTaskRecord {
    pub task_item: String,
    #[serde(default)]
    pub assignee_emails: Option<String>,
    #[serde(rename = "assignee(s)_full_names", default)]
    pub assignee_full_names: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub brief_description: Option<String>,
    /// Epoch milliseconds or null; anything else is dropped.
    #[serde(default)]
    pub due_date: Option<serde_json::Value>,
    #[serde(default)]
    pub status: Option<String>,
}

impl RawTaskRecord {
    /// The required keys, mirroring the prompt contract. Records missing
    /// any of them are discarded.
    pub fn has_required_fields(&self) -> bool {
        !self.task_item.trim().is_empty()
            && self.assignee_emails.is_some()
            && self.assignee_full_names.is_some()
            && self.priority.is_some()
            && self.brief_description.is_some()
            && self.status.is_some()
    }

    pub fn due_date_millis(&self) -> Option<i64> {
        self.due_date.as_ref().and_then(|v| v.as_i64())
    }
}

/// Strip markdown code fences the model sometimes wraps around its JSON.
fn strip_fences(output: &str) -> &str {
    let mut cleaned = output.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

/// Parse model output into task records.
///
/// A single object is coerced into a one-element array; a non-array value
/// or unparsable text yields an empty vec.
pub fn parse_llm_output(output: &str) -> Vec<RawTaskRecord> {
    let cleaned = strip_fences(output);

    let value: serde_json::Value = match serde_json::from_str(cleaned) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "LLM output is not valid JSON");
            return Vec::new();
        }
    };

    let items = match value {
        serde_json::Value::Array(items) => items,
        object @ serde_json::Value::Object(_) => vec![object],
        other => {
            warn!(kind = %value_kind(&other), "LLM output is not a JSON array");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<RawTaskRecord>(item) {
            Ok(record) if record.has_required_fields() => Some(record),
            Ok(_) => {
                warn!("dropping task record with missing required keys");
                None
            }
            Err(e) => {
                warn!(error = %e, "dropping unreadable task record");
                None
            }
        })
        .collect()
}

fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Split a comma-separated field, trimming blanks and duplicates while
/// preserving order.
pub fn split_list(raw: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for part in raw.split(',') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.iter().any(|s: &String| s.eq_ignore_ascii_case(trimmed)) {
            continue;
        }
        seen.push(trimmed.to_string());
    }
    seen
}
