//! Mock implementations of the external service traits, used by unit and
//! end-to-end tests so no real infrastructure is needed.

mod mock_llm;
mod mock_sink;
mod mock_source;

pub use mock_llm::MockLlmClient;
pub use mock_sink::MockWorkItemSink;
pub use mock_source::MockTranscriptSource;

/// Test fixtures shared across the crate's tests.
pub mod fixtures {
    use crate::transcript::RawTranscript;

    /// Build a transcript with a title, an epoch-millisecond meeting date
    /// and a couple of spoken sentences.
    pub fn transcript(id: &str, title: &str, date_ms: i64) -> RawTranscript {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": title,
            "date": date_ms,
            "organizer_email": "alice@example.com",
            "summary": {
                "overview": "Weekly planning discussion.",
                "action_items": "Bob to draft the proposal"
            },
            "sentences": [
                {
                    "speaker_name": "Alice",
                    "text": "Bob, can you draft the proposal for the client by tomorrow?",
                    "start_time": 10.0
                },
                {
                    "speaker_name": "Bob",
                    "text": "Sure, I will draft the proposal right away.",
                    "start_time": 15.0
                }
            ],
            "meeting_attendees": [
                {"displayName": "Alice Smith", "email": "alice@example.com"},
                {"displayName": "Bob Jones", "email": "bob@example.com"}
            ]
        }))
        .expect("valid fixture")
    }

    /// A single-record extraction output in the shape the prompt demands.
    pub fn extraction_output(task_item: &str) -> String {
        format!(
            r#"[{{
                "task_item": "{task_item}",
                "assignee_emails": "bob@example.com",
                "assignee(s)_full_names": "Bob Jones",
                "priority": "High",
                "brief_description": "Alice asked Bob to put together the full proposal for the client covering scope pricing and timeline so the team can review everything together before it goes out to the client on Friday",
                "due_date": null,
                "status": "To Do"
            }}]"#
        )
    }
}
