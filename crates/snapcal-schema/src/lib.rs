use chrono::{DateTime, Datelike, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Input modality. Selects the prompt variant and tags history records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Image,
    Text,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Image => "image",
            Modality::Text => "text",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Binary image payload as produced by the camera/gallery/file picker.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageInput {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }
}

/// Raw input handed to the pipeline. Consumed once per extraction call.
#[derive(Debug, Clone)]
pub enum RawExtractionInput {
    Image(ImageInput),
    Text { content: String },
}

impl RawExtractionInput {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn image(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self::Image(ImageInput::new(bytes, mime_type))
    }

    pub fn modality(&self) -> Modality {
        match self {
            Self::Image(_) => Modality::Image,
            Self::Text { .. } => Modality::Text,
        }
    }
}

/// Date context injected into the prompt and the normalizer so that date
/// inference never reads the ambient clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionContext {
    /// IANA timezone name, e.g. "Europe/Berlin"
    pub timezone_name: String,
    /// Year assumed when the source gives only a day and month
    pub current_year: i32,
    /// Local instant of the call
    pub now: DateTime<FixedOffset>,
}

impl ExtractionContext {
    pub fn new(timezone_name: impl Into<String>, now: DateTime<FixedOffset>) -> Self {
        Self {
            timezone_name: timezone_name.into(),
            current_year: now.year(),
            now,
        }
    }

    /// Local calendar date of `now`.
    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}

/// Loosely-typed event as parsed from a model response. Any field may be
/// missing; wrong-typed fields are read as missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEvent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub start_time: Option<String>,
    pub end_date: Option<String>,
    pub end_time: Option<String>,
    pub location: Option<String>,
    pub is_all_day: Option<bool>,
}

impl CandidateEvent {
    /// Read a candidate out of an arbitrary JSON value. Returns `None` for
    /// anything that is not an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| object.get(*key).and_then(Value::as_str))
                .map(str::to_string)
        };

        Some(Self {
            title: text(&["title"]),
            description: text(&["description"]),
            start_date: text(&["startDate", "start_date"]),
            start_time: text(&["startTime", "start_time"]),
            end_date: text(&["endDate", "end_date"]),
            end_time: text(&["endTime", "end_time"]),
            location: text(&["location"]),
            is_all_day: ["isAllDay", "is_all_day", "allDay"]
                .iter()
                .find_map(|key| object.get(*key))
                .map(truthy_flag),
        })
    }
}

/// `true` only for a literal boolean, the string "true" or the number 1.
fn truthy_flag(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    }
}

/// Provenance of a calendar event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Manual,
    Ai,
    Import,
}

/// Validated, storage-ready event. Immutable once produced by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    /// YYYY-MM-DD
    pub start_date: String,
    /// HH:MM, 24-hour
    pub start_time: String,
    pub end_date: String,
    pub end_time: String,
    pub location: String,
    pub is_all_day: bool,
    /// Minutes before the event
    pub reminder: u32,
    /// Calendar name/category
    pub calendar: String,
    pub source: EventSource,
    pub created_at: DateTime<FixedOffset>,
}

/// Settings-driven values the pipeline stamps onto every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventDefaults {
    pub calendar: String,
    pub reminder_minutes: u32,
}

impl Default for EventDefaults {
    fn default() -> Self {
        Self {
            calendar: "Personal".to_string(),
            reminder_minutes: 15,
        }
    }
}
