//! Extraction prompt template, compiled and validated at construction.

use thiserror::Error;

use crate::transcript::RawTranscript;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template is missing required slot {{{0}}}")]
    MissingSlot(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Title,
    MeetingDateMs,
    OrganizerEmail,
    Attendees,
    ActionItems,
    Overview,
    Transcript,
}

impl Slot {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "title" => Some(Slot::Title),
            "meeting_date_ms" => Some(Slot::MeetingDateMs),
            "organizer_email" => Some(Slot::OrganizerEmail),
            "attendees" => Some(Slot::Attendees),
            "action_items" => Some(Slot::ActionItems),
            "overview" => Some(Slot::Overview),
            "transcript" => Some(Slot::Transcript),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Slot::Title => "title",
            Slot::MeetingDateMs => "meeting_date_ms",
            Slot::OrganizerEmail => "organizer_email",
            Slot::Attendees => "attendees",
            Slot::ActionItems => "action_items",
            Slot::Overview => "overview",
            Slot::Transcript => "transcript",
        }
    }

    const ALL: [Slot; 7] = [
        Slot::Title,
        Slot::MeetingDateMs,
        Slot::OrganizerEmail,
        Slot::Attendees,
        Slot::ActionItems,
        Slot::Overview,
        Slot::Transcript,
    ];
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Slot(Slot),
}

/// A prompt template with named slots.
///
/// `{name}` becomes a slot only when `name` is one of the known slot names;
/// any other braced text stays literal, so JSON examples inside the prompt
/// survive untouched. Construction fails if a required slot is absent,
/// which surfaces a broken template at startup instead of at extraction
/// time.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn new(text: &str) -> Result<Self, PromptError> {
        let segments = Self::compile(text);
        for slot in Slot::ALL {
            let present = segments
                .iter()
                .any(|s| matches!(s, Segment::Slot(found) if *found == slot));
            if !present {
                return Err(PromptError::MissingSlot(slot.name()));
            }
        }
        Ok(Self { segments })
    }

    /// The stock extraction prompt.
    pub fn standard() -> Self {
        // The default template contains every slot, so this cannot fail.
        Self::new(DEFAULT_TEMPLATE).expect("default template is valid")
    }

    fn compile(text: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = text;

        while let Some(open) = rest.find('{') {
            let (before, after_open) = rest.split_at(open);
            literal.push_str(before);
            match after_open[1..].find('}') {
                Some(close) => {
                    let name = &after_open[1..1 + close];
                    if let Some(slot) = Slot::from_name(name) {
                        if !literal.is_empty() {
                            segments.push(Segment::Literal(std::mem::take(&mut literal)));
                        }
                        segments.push(Segment::Slot(slot));
                    } else {
                        literal.push_str(&after_open[..close + 2]);
                    }
                    rest = &after_open[close + 2..];
                }
                None => {
                    literal.push_str(after_open);
                    rest = "";
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        segments
    }

    /// Fill every slot from the transcript. Deterministic for a given
    /// transcript, which makes the rendered prompt safe to hash for
    /// caching.
    pub fn render(&self, transcript: &RawTranscript) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(slot) => out.push_str(&Self::fill(*slot, transcript)),
            }
        }
        out
    }

    fn fill(slot: Slot, transcript: &RawTranscript) -> String {
        match slot {
            Slot::Title => transcript.display_title().to_string(),
            Slot::MeetingDateMs => transcript
                .date
                .map(|ms| ms.to_string())
                .unwrap_or_default(),
            Slot::OrganizerEmail => transcript
                .organizer_email
                .clone()
                .unwrap_or_default(),
            Slot::Attendees => {
                let lines: Vec<String> = transcript
                    .meeting_attendees
                    .iter()
                    .map(|a| {
                        format!(
                            "- {} <{}>",
                            a.display_name.as_deref().unwrap_or("Unknown"),
                            a.email.as_deref().unwrap_or("no-email")
                        )
                    })
                    .collect();
                lines.join("\n")
            }
            Slot::ActionItems => transcript
                .summary
                .as_ref()
                .and_then(|s| s.action_items.clone())
                .unwrap_or_else(|| "No explicit action items listed.".to_string()),
            Slot::Overview => transcript
                .summary
                .as_ref()
                .and_then(|s| s.overview.clone())
                .unwrap_or_else(|| "No overview available.".to_string()),
            Slot::Transcript => {
                let lines: Vec<String> = transcript
                    .sentences
                    .iter()
                    .filter(|s| !s.spoken_text().is_empty())
                    .map(|s| {
                        format!(
                            "{}: {} (t={})",
                            s.speaker_name.as_deref().unwrap_or("Unknown"),
                            s.spoken_text(),
                            s.start_time.unwrap_or(0.0)
                        )
                    })
                    .collect();
                lines.join("\n")
            }
        }
    }
}

const DEFAULT_TEMPLATE: &str = r#"=== System ===
You are **TaskForge**, an expert AI assistant whose only objective is to extract
actionable to-do items from meeting-transcript JSON with maximum factual
accuracy and natural-sounding output.
Return **only** a JSON array (no markdown, comments, or prose) where each
object has **exactly** the following keys, in this order:

1. "task_item"                   - string, at least 10 natural, coherent words
2. "assignee_emails"             - string (comma-separated if > 1)
3. "assignee(s)_full_names"      - string (comma-separated likewise)
4. "priority"                    - "High" | "Medium" | "Low"
5. "brief_description"           - string, 30-50 words, human tone
6. "due_date"                    - integer (UTC ms) | null
7. "status"                      - "To Do" | "Stuck" | "Working on it" | "Waiting for review" | "Approved" | "Done"

No other keys are permitted. Preserve the order in which tasks appear in the
source material.

--------------------------------------------------------------------
EXTRACTION LOGIC
--------------------------------------------------------------------
A. **Source hierarchy**
   1. `summary.action_items` list
   2. Sentences that contain actionable cues
      ("X will ...", "Can you ...", "Let's have X ...", "I'll ...", "Please ...")
   3. `summary.overview` for implicit commitments

B. **Assignee resolution & deduplication**
   - Map names to `meeting_attendees[].{displayName,email}`
   - If wording clearly assigns several people, include them all
     (comma-separated).
   - Never repeat the same email within a task.

C. **Validity filter**
   - Extract wording that contains a future deliverable or request, including
     completed work (mark it clearly as done), but ignore vague discussion
     unless it still requires action.

D. **Priority rules**
   - Hard deadline / blocker -> High
   - Multi-day / strategic   -> Medium
   - Informational / minor   -> Low

--------------------------------------------------------------------
ROBUST DUE-DATE ENGINE (WEEKEND-AWARE)
--------------------------------------------------------------------
1. **Absolute phrases** - parse and convert to 23:59:59 local, then to UTC ms.
2. **Relative phrases** - anchor to meeting date `M` (local) and skip weekends:

phrase                          -> computed due date (17:00 local unless noted)
-------------------------------------------------------------------------------
"today" / "tonight"             -> M
"tomorrow" / "ASAP"             -> next calendar day; if Sat/Sun, roll to Monday
"this week"                     -> Friday of M's week; if Fri/Sat/Sun, roll to next Monday
"next week"                     -> next Monday
"within N days"                 -> add N *business* days (skip Sat/Sun)
"after the meeting"             -> end-of-day M
explicit weekday ("on Tuesday") -> next occurrence; if on or before M, +7 days

If multiple cues conflict, keep the earliest resulting business day.
If no temporal cue exists, set "due_date": null.

**Best Practices:**
- Never set a due date to a day before the meeting date (`M`).
- Unless the phrase is explicitly "today" or "EOD", the due date should be at
  least `M + 1 day`.

--------------------------------------------------------------------
TASK-ITEM LENGTH RULE
--------------------------------------------------------------------
If the original sentence has < 10 words, append context from the same or
adjacent sentence(s) until the threshold is met.
Do **not** pad with meaningless words.

--------------------------------------------------------------------
BRIEF DESCRIPTION GUIDELINES
--------------------------------------------------------------------
- 30-50 words.
- Begin with "<Assigner Full Name> asked <Assignee First Name> ...".
- Quote 1-2 short phrases directly from the transcript for a human tone.
- Explain purpose, method, collaborators, and timing.

--------------------------------------------------------------------
COUNT & ORDER
--------------------------------------------------------------------
- Output approximately the number of explicit action items, plus or minus 2.
- Preserve chronological order of appearance.
- Skip duplicates (normalise case, whitespace, timestamps).

If no items meet these rules, return `[]`, or any done items discussed. Not
every meeting generates action items. Be aware of meetings marked "silent"
but do not fail to scrutinize in order to verify the tag is correct.

--------------------------------------------------------------------
=== User ===
Process only this meeting-transcript JSON:

* title                -> {title}
* meeting_date_ms      -> {meeting_date_ms}
* organizer_email      -> {organizer_email}

Attendees (name <-> email):
{attendees}

Explicit Action Items:
{action_items}

Meeting Overview:
{overview}

Full Transcript:
{transcript}

Return ONLY the JSON array described above."#;
