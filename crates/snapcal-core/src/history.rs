//! Processing history: one JSON line per extraction attempt.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snapcal_schema::{CalendarEvent, Modality};
use uuid::Uuid;

use crate::ExtractionError;

/// Where the extracted content came from. `File` is text read from disk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    Image,
    Text,
    File,
}

impl From<Modality> for RecordSource {
    fn from(modality: Modality) -> Self {
        match modality {
            Modality::Image => Self::Image,
            Modality::Text => Self::Text,
        }
    }
}

impl std::fmt::Display for RecordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Self::Image => "image",
            Self::Text => "text",
            Self::File => "file",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source: RecordSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub events_found: usize,
    #[serde(default)]
    pub events: Vec<CalendarEvent>,
    pub processing_time_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessingRecord {
    pub fn from_outcome(
        source: RecordSource,
        file_name: Option<String>,
        outcome: &Result<Vec<CalendarEvent>, ExtractionError>,
        elapsed: Duration,
    ) -> Self {
        let (events, error) = match outcome {
            Ok(events) => (events.clone(), None),
            Err(err) => (Vec::new(), Some(err.to_string())),
        };
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source,
            file_name,
            events_found: events.len(),
            events,
            processing_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            success: error.is_none(),
            error,
        }
    }
}

/// Append-only JSONL file of [`ProcessingRecord`]s.
pub struct JsonlHistoryStore {
    path: PathBuf,
}

impl JsonlHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &ProcessingRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create history dir: {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open history file: {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("failed to write history file: {}", self.path.display()))?;
        Ok(())
    }

    /// Newest first. Unreadable lines are skipped with a warning.
    pub fn recent(&self, limit: usize) -> Result<Vec<ProcessingRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read history file: {}", self.path.display()))?;

        let mut records = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ProcessingRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(line = index + 1, "skipping corrupt history entry: {e}"),
            }
        }

        records.reverse();
        records.truncate(limit);
        Ok(records)
    }
}
