//! Structured log entries scoped to a session or step

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Append-only log record, immutable once written
///
/// There is no update or delete; consumers sort by `timestamp` for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowLogEntry {
    /// Assigned at append time
    pub entry_id: Uuid,

    pub session_id: String,
    pub step_id: Option<String>,

    pub level: LogLevel,
    pub message: String,

    /// Structured payload attached by the pipeline stage
    pub details: Option<serde_json::Value>,
    pub exception: Option<String>,

    /// Emitting component, e.g. "semantic-analyzer"
    pub source: Option<String>,

    /// Unix milliseconds
    pub timestamp: u64,
}
