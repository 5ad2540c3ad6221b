//! Weekend-aware due-date derivation from temporal phrases.
//!
//! The extraction prompt describes these rules to the model, but the model's
//! arithmetic is not trusted: the same rules are enforced here over the
//! task text, anchored to the meeting date `M`.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use regex_lite::Regex;

/// Due times are pinned to fixed UTC clock times: 17:00 for derived dates,
/// 23:59:59 for same-day ("today" / end-of-day) dates.
const DUE_HOUR: u32 = 17;

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Saturday and Sunday roll forward to the next Monday.
pub fn roll_weekend_forward(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date + Duration::days(2),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

/// Advance `n` business days, never landing on a weekend.
pub fn add_business_days(start: NaiveDate, n: u32) -> NaiveDate {
    let mut date = start;
    for _ in 0..n {
        date += Duration::days(1);
        date = roll_weekend_forward(date);
    }
    date
}

/// First occurrence of `target` strictly after `after`.
fn next_weekday(after: NaiveDate, target: Weekday) -> NaiveDate {
    let mut date = after + Duration::days(1);
    while date.weekday() != target {
        date += Duration::days(1);
    }
    date
}

/// Friday of the meeting's week, or next Monday when the meeting already
/// sits on Friday or the weekend.
fn end_of_this_week(meeting: NaiveDate) -> NaiveDate {
    match meeting.weekday() {
        Weekday::Mon | Weekday::Tue | Weekday::Wed | Weekday::Thu => {
            let days_to_friday =
                Weekday::Fri.num_days_from_monday() - meeting.weekday().num_days_from_monday();
            meeting + Duration::days(days_to_friday as i64)
        }
        _ => next_weekday(meeting, Weekday::Mon),
    }
}

fn at_due_time(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(DUE_HOUR, 0, 0)
        .expect("valid time")
        .and_utc()
}

fn at_end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(23, 59, 59)
        .expect("valid time")
        .and_utc()
}

/// Whether the text carries a same-day cue, which permits a due date on the
/// meeting day itself.
fn has_today_cue(text: &str) -> bool {
    let lowered = text.to_lowercase();
    ["today", "tonight", "eod", "end of day", "after the meeting"]
        .iter()
        .any(|cue| lowered.contains(cue))
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Derive a due date from temporal phrases in `text`, anchored to the
/// meeting timestamp. Returns `None` when no temporal cue is present.
///
/// Conflicting cues resolve to the earliest candidate that lands on a
/// business day.
pub fn derive_due_date(text: &str, meeting: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lowered = text.to_lowercase();
    let m = meeting.date_naive();
    let mut candidates: Vec<DateTime<Utc>> = Vec::new();

    if has_today_cue(&lowered) {
        candidates.push(at_end_of_day(m));
    }
    if lowered.contains("tomorrow") || lowered.contains("asap") {
        candidates.push(at_due_time(roll_weekend_forward(m + Duration::days(1))));
    }
    if lowered.contains("this week") {
        candidates.push(at_due_time(end_of_this_week(m)));
    }
    if lowered.contains("next week") {
        candidates.push(at_due_time(next_weekday(m, Weekday::Mon)));
    }

    let within = Regex::new(r"within\s+(\d+)\s+(?:business\s+)?days?").expect("valid regex");
    if let Some(caps) = within.captures(&lowered) {
        if let Ok(n) = caps[1].parse::<u32>() {
            candidates.push(at_due_time(add_business_days(m, n)));
        }
    }

    let weekday_re =
        Regex::new(r"\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")
            .expect("valid regex");
    for caps in weekday_re.captures_iter(&lowered) {
        if let Some(target) = weekday_from_name(&caps[1]) {
            candidates.push(at_due_time(next_weekday(m, target)));
        }
    }

    if candidates.is_empty() {
        return None;
    }
    candidates.sort();
    let chosen = candidates
        .iter()
        .find(|c| !is_weekend(c.date_naive()))
        .copied()
        .unwrap_or(candidates[0]);
    Some(clamp(chosen, meeting, has_today_cue(&lowered)))
}

/// Clamp a candidate due date (for example one produced by the model)
/// against the meeting date: never earlier than `M`, and at least `M + 1`
/// business day unless the text carries a same-day cue.
pub fn clamp_due_date(
    candidate: DateTime<Utc>,
    meeting: DateTime<Utc>,
    text: &str,
) -> DateTime<Utc> {
    clamp(candidate, meeting, has_today_cue(&text.to_lowercase()))
}

fn clamp(candidate: DateTime<Utc>, meeting: DateTime<Utc>, same_day_allowed: bool) -> DateTime<Utc> {
    let m = meeting.date_naive();
    let candidate_date = candidate.date_naive();

    if same_day_allowed {
        if candidate_date < m {
            return at_end_of_day(m);
        }
        return candidate;
    }
    if candidate_date <= m {
        return at_due_time(roll_weekend_forward(m + Duration::days(1)));
    }
    candidate
}
