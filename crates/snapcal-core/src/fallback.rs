//! Best-effort recovery for model output that is not a clean JSON array.
//!
//! Passes run in order and the first one that yields candidates wins:
//! 1. a balanced JSON array embedded in surrounding prose,
//! 2. every balanced top-level JSON object (recovers truncated arrays),
//! 3. `Key: value` line blocks separated by blank lines.
//!
//! Plain prose with none of these shapes yields an empty list.

use serde_json::Value;
use snapcal_schema::CandidateEvent;

use crate::parse::candidates_from_value;

/// Upper bound on `[` positions probed for an embedded array.
const MAX_ARRAY_PROBES: usize = 32;

pub fn extract(raw: &str) -> Vec<CandidateEvent> {
    let embedded = embedded_array(raw);
    if !embedded.is_empty() {
        return embedded;
    }

    let objects = embedded_objects(raw);
    if !objects.is_empty() {
        return objects;
    }

    key_value_blocks(raw)
}

/// End offset (exclusive) of the balanced span opening at `start`, or `None`
/// if the input ends first. Brackets inside JSON strings are ignored.
fn balanced_end(text: &str, start: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;

    for (offset, ch) in text[start..].char_indices() {
        if escape {
            escape = false;
            continue;
        }
        if in_string {
            match ch {
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if ch == '"' {
            in_string = true;
        } else if ch == open {
            depth += 1;
        } else if ch == close {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(start + offset + ch.len_utf8());
            }
        }
    }
    None
}

fn embedded_array(raw: &str) -> Vec<CandidateEvent> {
    for (start, _) in raw.match_indices('[').take(MAX_ARRAY_PROBES) {
        let Some(end) = balanced_end(raw, start, '[', ']') else {
            continue;
        };
        if let Ok(value) = serde_json::from_str::<Value>(&raw[start..end]) {
            let candidates = candidates_from_value(&value);
            if !candidates.is_empty() {
                return candidates;
            }
        }
    }
    Vec::new()
}

fn embedded_objects(raw: &str) -> Vec<CandidateEvent> {
    let mut candidates = Vec::new();
    let mut cursor = 0;

    while let Some(found) = raw[cursor..].find('{') {
        let start = cursor + found;
        let Some(end) = balanced_end(raw, start, '{', '}') else {
            break;
        };
        match serde_json::from_str::<Value>(&raw[start..end]) {
            Ok(value) => {
                if let Some(candidate) = CandidateEvent::from_value(&value) {
                    candidates.push(candidate);
                }
                cursor = end;
            }
            Err(_) => cursor = start + 1,
        }
    }

    candidates
}

enum Field {
    Title,
    Description,
    StartDate,
    StartTime,
    EndDate,
    EndTime,
    Location,
    AllDay,
}

fn field_for_key(key: &str) -> Option<Field> {
    let normalized: String = key
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();

    let field = match normalized.as_str() {
        "title" | "eventname" | "eventtitle" => Field::Title,
        "description" | "details" | "notes" => Field::Description,
        "date" | "startdate" | "day" => Field::StartDate,
        "time" | "starttime" | "start" => Field::StartTime,
        "enddate" => Field::EndDate,
        "endtime" | "end" => Field::EndTime,
        "location" | "venue" | "where" | "place" => Field::Location,
        "allday" | "isallday" => Field::AllDay,
        _ => return None,
    };
    Some(field)
}

fn clean_value(value: &str) -> String {
    value
        .trim()
        .trim_end_matches(',')
        .trim_matches(|c| c == '"' || c == '\'' || c == '*')
        .trim()
        .to_string()
}

fn key_value_blocks(raw: &str) -> Vec<CandidateEvent> {
    let mut candidates = Vec::new();
    let mut current = CandidateEvent::default();
    let mut touched = false;

    let mut flush = |candidate: &mut CandidateEvent, touched: &mut bool| {
        if *touched && is_schedulable(candidate) {
            candidates.push(std::mem::take(candidate));
        } else {
            *candidate = CandidateEvent::default();
        }
        *touched = false;
    };

    for line in raw.lines() {
        let line = line
            .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•' || c.is_whitespace())
            .trim_end();
        if line.is_empty() {
            flush(&mut current, &mut touched);
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let Some(field) = field_for_key(key) else {
            continue;
        };
        let value = clean_value(value);
        if value.is_empty() {
            continue;
        }

        // A second title inside one block starts a new event.
        if matches!(field, Field::Title) && current.title.is_some() {
            flush(&mut current, &mut touched);
        }
        touched = true;

        match field {
            Field::Title => current.title = Some(value),
            Field::Description => current.description = Some(value),
            Field::StartDate => current.start_date = Some(value),
            Field::StartTime => match split_range(&value) {
                Some((start, end)) => {
                    current.start_time = Some(start);
                    current.end_time.get_or_insert(end);
                }
                None => current.start_time = Some(value),
            },
            Field::EndDate => current.end_date = Some(value),
            Field::EndTime => current.end_time = Some(value),
            Field::Location => current.location = Some(value),
            Field::AllDay => {
                let flag = value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes");
                current.is_all_day = Some(flag);
            }
        }
    }
    flush(&mut current, &mut touched);

    candidates
}

/// A block needs a title and something that places it in time. A lone
/// title line is prose, not an event.
fn is_schedulable(candidate: &CandidateEvent) -> bool {
    candidate.title.is_some()
        && (candidate.start_date.is_some()
            || candidate.start_time.is_some()
            || candidate.end_date.is_some()
            || candidate.end_time.is_some())
}

/// "10:00-11:30" or "10:00 – 11:30" into its two halves.
fn split_range(value: &str) -> Option<(String, String)> {
    let (start, end) = value
        .split_once(" to ")
        .or_else(|| value.split_once('–'))
        .or_else(|| value.split_once('-'))?;
    let (start, end) = (start.trim(), end.trim());
    if start.is_empty() || end.is_empty() {
        return None;
    }
    Some((start.to_string(), end.to_string()))
}
