//! Candidate events to canonical calendar events.
//!
//! Pure apart from id generation: no I/O, never fails. Candidates without a
//! usable title are dropped; everything else is defaulted.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use rand::Rng;
use snapcal_schema::{CalendarEvent, CandidateEvent, EventDefaults, EventSource, ExtractionContext};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";
const ALL_DAY_TIME: &str = "00:00";
const ID_SUFFIX_LEN: usize = 9;

const TIME_INPUT_FORMATS: [&str; 4] = ["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M%p"];
const PLACEHOLDERS: [&str; 5] = ["n/a", "na", "none", "null", "-"];
const UNTITLED_EVENT: &str = "untitled event";

/// Start time used when the candidate gives none.
pub fn default_start_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Normalize candidates in input order. Duplicates pass through unchanged.
pub fn normalize(
    candidates: Vec<CandidateEvent>,
    ctx: &ExtractionContext,
    defaults: &EventDefaults,
) -> Vec<CalendarEvent> {
    let total = candidates.len();
    let events: Vec<CalendarEvent> = candidates
        .into_iter()
        .filter_map(|candidate| normalize_one(candidate, ctx, defaults))
        .collect();

    if events.len() < total {
        tracing::debug!(
            dropped = total - events.len(),
            kept = events.len(),
            "dropped candidates without a title"
        );
    }
    events
}

fn normalize_one(
    candidate: CandidateEvent,
    ctx: &ExtractionContext,
    defaults: &EventDefaults,
) -> Option<CalendarEvent> {
    let title = candidate
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| is_real_title(t))?
        .to_string();

    let is_all_day = candidate.is_all_day.unwrap_or(false);

    let start_date = candidate
        .start_date
        .as_deref()
        .and_then(parse_date)
        .unwrap_or_else(|| ctx.today());
    let end_date = candidate
        .end_date
        .as_deref()
        .and_then(parse_date)
        .unwrap_or(start_date);

    let (start_time, end_time) = if is_all_day {
        (ALL_DAY_TIME.to_string(), ALL_DAY_TIME.to_string())
    } else {
        let start = candidate
            .start_time
            .as_deref()
            .and_then(parse_time)
            .unwrap_or_else(default_start_time);
        let end = candidate
            .end_time
            .as_deref()
            .and_then(parse_time)
            .unwrap_or_else(|| default_end_time(start));
        (
            start.format(TIME_FORMAT).to_string(),
            end.format(TIME_FORMAT).to_string(),
        )
    };

    Some(CalendarEvent {
        id: generate_event_id(ctx),
        title,
        description: clean_text(candidate.description.as_deref()),
        start_date: start_date.format(DATE_FORMAT).to_string(),
        start_time,
        end_date: end_date.format(DATE_FORMAT).to_string(),
        end_time,
        location: clean_text(candidate.location.as_deref()),
        is_all_day,
        reminder: defaults.reminder_minutes,
        calendar: defaults.calendar.clone(),
        source: EventSource::Ai,
        created_at: ctx.now,
    })
}

/// One hour after `start`, wrapping past midnight. Minutes are unchanged.
pub fn default_end_time(start: NaiveTime) -> NaiveTime {
    start + Duration::hours(1)
}

/// `YYYY-MM-DD`, or the date prefix of an ISO date-time. Years outside
/// 1..=9999 are rejected so the output stays four digits wide.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let prefix = raw.get(..10).filter(|p| is_iso_date_shape(p))?;
    if !raw[10..].is_empty() && !raw[10..].starts_with(['T', 't', ' ']) {
        return None;
    }
    NaiveDate::parse_from_str(prefix, DATE_FORMAT)
        .ok()
        .filter(|date| (1..=9999).contains(&date.year()))
}

fn is_iso_date_shape(text: &str) -> bool {
    text.len() == 10
        && text.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        })
}

/// 24-hour `H:MM`/`HH:MM[:SS]` or 12-hour `h:MM AM/PM`.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    TIME_INPUT_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(raw, format).ok())
}

/// Non-empty and not a placeholder such as "N/A" or "Untitled Event".
fn is_real_title(title: &str) -> bool {
    !title.is_empty()
        && !PLACEHOLDERS.iter().any(|p| title.eq_ignore_ascii_case(p))
        && !title.eq_ignore_ascii_case(UNTITLED_EVENT)
}

fn clean_text(raw: Option<&str>) -> String {
    let Some(text) = raw.map(str::trim) else {
        return String::new();
    };
    if PLACEHOLDERS.iter().any(|p| text.eq_ignore_ascii_case(p)) {
        return String::new();
    }
    text.to_string()
}

/// `event_<millis>_<9 base-36 chars>`.
fn generate_event_id(ctx: &ExtractionContext) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .filter_map(|_| std::char::from_digit(rng.gen_range(0..36), 36))
        .collect();
    format!("event_{}_{}", ctx.now.timestamp_millis(), suffix)
}
