//! Calendar persistence seam and an iCalendar (RFC 5545) file implementation.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, Utc};
use snapcal_schema::CalendarEvent;

use crate::normalize::{parse_date, parse_time};

/// Per-event result of handing events to a calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOutcome {
    pub event_id: String,
    pub result: Result<(), String>,
}

impl InsertOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Consumes a finalized event list. Failures are reported per event.
#[async_trait]
pub trait CalendarSink: Send + Sync {
    async fn insert(&self, events: &[CalendarEvent]) -> Vec<InsertOutcome>;
}

/// Writes all accepted events into a single `.ics` file.
pub struct IcsFileSink {
    path: PathBuf,
}

impl IcsFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CalendarSink for IcsFileSink {
    async fn insert(&self, events: &[CalendarEvent]) -> Vec<InsertOutcome> {
        let mut body = String::new();
        let mut outcomes = Vec::with_capacity(events.len());

        for event in events {
            let result = render_event(event).map(|vevent| body.push_str(&vevent));
            outcomes.push(InsertOutcome {
                event_id: event.id.clone(),
                result,
            });
        }

        let document = wrap_calendar(&body);
        if let Err(e) = tokio::fs::write(&self.path, document).await {
            tracing::warn!(path = %self.path.display(), "failed to write ics file: {e}");
            let message = format!("failed to write {}: {e}", self.path.display());
            for outcome in outcomes.iter_mut().filter(|o| o.result.is_ok()) {
                outcome.result = Err(message.clone());
            }
        }

        outcomes
    }
}

/// Render a whole VCALENDAR document, skipping events that cannot be rendered.
pub fn render_calendar(events: &[CalendarEvent]) -> String {
    let body: String = events.iter().filter_map(|e| render_event(e).ok()).collect();
    wrap_calendar(&body)
}

fn wrap_calendar(body: &str) -> String {
    let mut out = String::new();
    push_line(&mut out, "BEGIN:VCALENDAR");
    push_line(&mut out, "VERSION:2.0");
    push_line(&mut out, "PRODID:-//snapcal//event extraction//EN");
    push_line(&mut out, "CALSCALE:GREGORIAN");
    out.push_str(body);
    push_line(&mut out, "END:VCALENDAR");
    out
}

fn render_event(event: &CalendarEvent) -> Result<String, String> {
    let start_date = parse_date(&event.start_date)
        .ok_or_else(|| format!("invalid start date: {}", event.start_date))?;
    let end_date = parse_date(&event.end_date)
        .ok_or_else(|| format!("invalid end date: {}", event.end_date))?;

    let mut out = String::new();
    push_line(&mut out, "BEGIN:VEVENT");
    push_line(&mut out, &format!("UID:{}@snapcal", event.id));
    push_line(
        &mut out,
        &format!(
            "DTSTAMP:{}",
            event.created_at.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ")
        ),
    );

    if event.is_all_day {
        // DTEND is exclusive for date values.
        let end = next_day(end_date.max(start_date))
            .ok_or_else(|| format!("end date out of range: {}", event.end_date))?;
        push_line(&mut out, &format!("DTSTART;VALUE=DATE:{}", ics_date(start_date)));
        push_line(&mut out, &format!("DTEND;VALUE=DATE:{}", ics_date(end)));
    } else {
        let start_time = parse_time(&event.start_time)
            .ok_or_else(|| format!("invalid start time: {}", event.start_time))?;
        let end_time = parse_time(&event.end_time)
            .ok_or_else(|| format!("invalid end time: {}", event.end_time))?;
        let start = NaiveDateTime::new(start_date, start_time);
        let mut end = NaiveDateTime::new(end_date, end_time);
        if end <= start {
            // An end time that wrapped past midnight belongs to the next day.
            let next = next_day(start_date)
                .ok_or_else(|| format!("end date out of range: {}", event.start_date))?;
            end = NaiveDateTime::new(next, end_time);
        }
        push_line(&mut out, &format!("DTSTART:{}", ics_datetime(start)));
        push_line(&mut out, &format!("DTEND:{}", ics_datetime(end)));
    }

    push_line(&mut out, &format!("SUMMARY:{}", escape_text(&event.title)));
    if !event.description.is_empty() {
        push_line(
            &mut out,
            &format!("DESCRIPTION:{}", escape_text(&event.description)),
        );
    }
    if !event.location.is_empty() {
        push_line(&mut out, &format!("LOCATION:{}", escape_text(&event.location)));
    }
    if !event.calendar.is_empty() {
        push_line(&mut out, &format!("CATEGORIES:{}", escape_text(&event.calendar)));
    }

    if event.reminder > 0 {
        push_line(&mut out, "BEGIN:VALARM");
        push_line(&mut out, "ACTION:DISPLAY");
        push_line(&mut out, &format!("DESCRIPTION:{}", escape_text(&event.title)));
        push_line(&mut out, &format!("TRIGGER:-PT{}M", event.reminder));
        push_line(&mut out, "END:VALARM");
    }

    push_line(&mut out, "END:VEVENT");
    Ok(out)
}

/// The following day, as long as it still has a four-digit year.
fn next_day(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_add_days(Days::new(1))
        .filter(|next| next.year() <= 9999)
}

fn ics_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

fn ics_datetime(at: NaiveDateTime) -> String {
    at.format("%Y%m%dT%H%M%S").to_string()
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(ch),
        }
    }
    out
}

/// Append a CRLF-terminated content line, folded at 75 octets.
fn push_line(out: &mut String, line: &str) {
    const LIMIT: usize = 75;
    let mut width = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > LIMIT {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(ch);
        width += len;
    }
    out.push_str("\r\n");
}
