//! Append-only log store for one session
//!
//! Entries are immutable once written; there is no update or delete. Ordering
//! across concurrent steps is by timestamp only — consumers sort for display.

use crate::model::{FlowLogEntry, LogLevel};
use uuid::Uuid;

/// Append request for one log entry
#[derive(Debug, Clone)]
pub struct LogRequest {
    pub step_id: Option<String>,
    pub level: LogLevel,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub exception: Option<String>,
    pub source: Option<String>,
}

impl LogRequest {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            step_id: None,
            level,
            message: message.into(),
            details: None,
            exception: None,
            source: None,
        }
    }

    pub fn for_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Per-session log sink
pub struct LogSink {
    session_id: String,
    entries: Vec<FlowLogEntry>,
    error_count: u64,
}

impl LogSink {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            entries: Vec::new(),
            error_count: 0,
        }
    }

    /// Append one entry, stamping id and timestamp
    pub fn append(&mut self, request: LogRequest, now: u64) -> FlowLogEntry {
        let entry = FlowLogEntry {
            entry_id: Uuid::new_v4(),
            session_id: self.session_id.clone(),
            step_id: request.step_id,
            level: request.level,
            message: request.message,
            details: request.details,
            exception: request.exception,
            source: request.source,
            timestamp: now,
        };

        if entry.level == LogLevel::Error {
            self.error_count += 1;
        }
        self.entries.push(entry.clone());

        entry
    }

    pub fn total(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn entries(&self) -> &[FlowLogEntry] {
        &self.entries
    }
}
