//! Transition journal - appends persisted transitions to file
//!
//! Transitions are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::domain::error::PersistError;
use crate::domain::types::{epoch_ms, TransitionEvent};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// One journal line, shaped the way the transition store expects it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// UUIDv7, time-ordered
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub site: Option<String>,
    pub zone_id: i64,
    pub unit: String,
    /// GPS time in `DD-Mon-YYYY HH:MM:SS` (raw text if unparseable)
    pub date_gps: String,
    pub event_gps: String,
    pub lat: f64,
    pub lon: f64,
    /// 1 inside, 2 outside
    pub geo_event: u8,
    pub message_type: u8,
    /// Epoch ms when the record was built
    pub ts: u64,
}

impl TransitionRecord {
    /// The record carries the event's id, so every copy of one transition matches
    pub fn from_event(event: &TransitionEvent) -> Self {
        Self {
            id: event.id.clone(),
            site: None,
            zone_id: event.zone_id.0,
            unit: event.unit.to_string(),
            date_gps: event.timestamp.store_format(),
            event_gps: event.event_code.clone(),
            lat: event.point.lat,
            lon: event.point.lon,
            geo_event: event.state.code(),
            message_type: event.message_type,
            ts: epoch_ms(),
        }
    }
}

/// Append-only JSONL journal of transitions
pub struct TransitionJournal {
    file_path: String,
}

impl TransitionJournal {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "journal_initialized");
        Self { file_path: file_path.to_string() }
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    /// Append one transition; returns the record that was written
    pub fn append(&self, event: &TransitionEvent) -> Result<TransitionRecord, PersistError> {
        let record = TransitionRecord::from_event(event);
        let json = serde_json::to_string(&record)?;
        self.append_line(&json)?;
        Ok(record)
    }

    /// Append a line to the journal file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "journal_written");

        Ok(())
    }
}
