//! Extraction instruction sent to the model.
//!
//! The prompt is a pure function of the modality, the [`ExtractionContext`]
//! and the [`InferenceTable`]; identical inputs always render identical text.

use std::fmt::Write;

use chrono::NaiveTime;
use snapcal_schema::{ExtractionContext, Modality};

/// Keys every object in the model output must carry, in schema order.
pub const SCHEMA_KEYS: [&str; 8] = [
    "title",
    "description",
    "startDate",
    "startTime",
    "endDate",
    "endTime",
    "location",
    "isAllDay",
];

/// A temporal keyword group and the time window it implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBlock {
    pub keywords: Vec<String>,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeBlock {
    pub fn new(keywords: &[&str], start: (u32, u32), end: (u32, u32)) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            start: hm(start),
            end: hm(end),
        }
    }
}

fn hm((hour, minute): (u32, u32)) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// Rules the model uses to fill in times the source leaves implicit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceTable {
    pub blocks: Vec<TimeBlock>,
    /// Added to a start time when no end time is known.
    pub default_duration_minutes: u32,
}

impl Default for InferenceTable {
    fn default() -> Self {
        Self {
            blocks: vec![
                TimeBlock::new(&["Morning", "Breakfast"], (9, 0), (10, 0)),
                TimeBlock::new(&["Afternoon", "Lunch"], (14, 0), (15, 0)),
                TimeBlock::new(&["Evening", "Social Hour"], (18, 0), (19, 0)),
                TimeBlock::new(&["Night", "Social Night"], (21, 0), (22, 0)),
            ],
            default_duration_minutes: 60,
        }
    }
}

fn describe_duration(minutes: u32) -> String {
    match (minutes / 60, minutes % 60) {
        (1, 0) => "1 hour".to_string(),
        (h, 0) => format!("{h} hours"),
        _ => format!("{minutes} minutes"),
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    table: InferenceTable,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inference_table(mut self, table: InferenceTable) -> Self {
        self.table = table;
        self
    }

    pub fn inference_table(&self) -> &InferenceTable {
        &self.table
    }

    /// Render the instruction for one extraction call.
    pub fn build(&self, modality: Modality, ctx: &ExtractionContext) -> String {
        let subject = match modality {
            Modality::Image => "the attached image",
            Modality::Text => "the text content that follows these instructions",
        };

        let mut out = String::new();
        let _ = writeln!(
            out,
            "You are an Event Data Extraction Agent that turns visual and textual information into structured calendar data."
        );
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Analyze {subject} and extract every explicit or implicit calendar event."
        );
        let _ = writeln!(out);

        let _ = writeln!(out, "1. Output Contract");
        let _ = writeln!(
            out,
            "    * Return a single, minified, valid JSON array and nothing else. No markdown, no commentary."
        );
        let _ = writeln!(
            out,
            "    * Every object in the array MUST use exactly the keys of the schema below. Do not add or omit keys."
        );
        let _ = writeln!(
            out,
            "    * If no events, appointments or scheduled activities are found, return an empty array: []"
        );
        let _ = writeln!(
            out,
            "    * Timezone: all times are local to the user's timezone ({}).",
            ctx.timezone_name
        );
        let _ = writeln!(
            out,
            "    * Year: if a date gives only a day and month, assume the year {}.",
            ctx.current_year
        );
        let _ = writeln!(out);

        let _ = writeln!(out, "2. Output Schema");
        let _ = writeln!(out, "{}", schema_block());
        let _ = writeln!(out);

        let _ = writeln!(out, "3. Extraction Rules");
        let _ = writeln!(
            out,
            "    * title: the most descriptive concise summary from the source, e.g. \"Team Meeting\" or \"Lunch with Sarah\"."
        );
        let _ = writeln!(
            out,
            "    * startDate / endDate: strict ISO 8601 calendar dates (YYYY-MM-DD)."
        );
        let _ = writeln!(
            out,
            "    * startTime / endTime: 24-hour clock (HH:MM). Convert AM/PM times."
        );
        let _ = writeln!(
            out,
            "    * Time inference: if no time is given but a temporal keyword is present, use this table:"
        );
        for block in &self.table.blocks {
            let _ = writeln!(
                out,
                "        - \"{}\": startTime {} and endTime {}.",
                block.keywords.join("/"),
                block.start.format("%H:%M"),
                block.end.format("%H:%M")
            );
        }
        let _ = writeln!(
            out,
            "        - Default duration: if only a start time is known (explicit or inferred), set endTime to startTime plus {}.",
            describe_duration(self.table.default_duration_minutes)
        );
        let _ = writeln!(
            out,
            "    * All day: if neither a time nor a temporal keyword is mentioned (e.g. \"Holiday on July 4th\"), set isAllDay to true and set both startTime and endTime to \"00:00\"."
        );
        let _ = writeln!(
            out,
            "    * location / description: use an empty string when the source has no such detail. Do not write placeholders such as \"N/A\"."
        );

        out
    }
}

fn schema_block() -> String {
    let mut block = String::from("{\n");
    for (i, key) in SCHEMA_KEYS.iter().enumerate() {
        let kind = match *key {
            "startDate" | "endDate" => "YYYY-MM-DD",
            "startTime" | "endTime" => "HH:MM",
            "isAllDay" => "boolean",
            _ => "string",
        };
        let sep = if i + 1 == SCHEMA_KEYS.len() { "" } else { "," };
        let _ = writeln!(block, "  \"{key}\": \"{kind}\"{sep}");
    }
    block.push('}');
    block
}
