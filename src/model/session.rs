//! Session record and read-side snapshot types

use crate::model::step::{FlowStep, StepStatus};
use crate::model::transparency::TransparencyRecord;
use crate::model::value::Metadata;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Error,
    Cancelled,
}

impl SessionStatus {
    /// Terminal sessions are immutable except for late-arriving logs
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

/// One tracked pipeline execution for a single user query
///
/// The `session_id` is caller-supplied and globally unique. The record is
/// mutated only by the registry that owns it; once terminal it never changes
/// again (trailing logs attach to the session but do not touch this record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSession {
    pub session_id: String,
    pub user_id: String,

    /// Original request text
    pub query: String,
    pub query_type: String,

    pub status: SessionStatus,

    /// Unix milliseconds
    pub start_time: u64,
    pub end_time: Option<u64>,
    pub total_duration_ms: Option<u64>,

    /// Roll-up over completed-step confidences, 0.0-1.0
    pub overall_confidence: Option<f64>,

    /// Produced artifact, e.g. generated SQL
    pub generated_artifact: Option<String>,
    pub execution_result: Option<String>,
    pub error_message: Option<String>,

    /// Optional correlation keys for grouping into a conversation
    pub conversation_id: Option<String>,
    pub message_id: Option<String>,

    #[serde(default)]
    pub metadata: Metadata,
}

/// Step counts by status for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounts {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub error: u64,
    pub cancelled: u64,
    pub skipped: u64,
}

impl StepCounts {
    pub fn record(&mut self, status: StepStatus) {
        match status {
            StepStatus::Pending => self.pending += 1,
            StepStatus::Running => self.running += 1,
            StepStatus::Completed => self.completed += 1,
            StepStatus::Error => self.error += 1,
            StepStatus::Cancelled => self.cancelled += 1,
            StepStatus::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.pending + self.running + self.completed + self.error + self.cancelled + self.skipped
    }
}

/// Immutable read model returned by `get_session`
///
/// The aggregates (step counts, log counts) are computed at read time, never
/// stored redundantly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: FlowSession,

    /// Steps sorted by `step_order` for display sequencing
    pub steps: Vec<FlowStep>,
    pub step_counts: StepCounts,

    pub log_count: u64,
    pub error_log_count: u64,

    pub transparency: Option<TransparencyRecord>,
}
