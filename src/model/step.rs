//! Step record and status state machine
//!
//! Steps form a per-session forest linked by `parent_step_id`. Valid
//! transitions:
//!
//! - `Pending` -> `Running`
//! - `Running` -> `Completed` | `Error` | `Cancelled`
//! - `Error` -> `Running` (retry, increments `retry_count`)
//! - `Pending` -> `Skipped` (ancestor failed before this step ever ran)
//!
//! A same-status upsert is a legal no-op merge. No other jumps are allowed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Step lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Error,
    Cancelled,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Error | Self::Cancelled | Self::Skipped
        )
    }

    /// Whether `next` is a legal transition from the current status
    ///
    /// Same-status transitions are legal (idempotent merge). `Error -> Running`
    /// is the retry edge.
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Skipped)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Error)
                | (Self::Running, Self::Cancelled)
                | (Self::Error, Self::Running)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown step status '{}'", other)),
        }
    }
}

/// One named stage within a session's pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStep {
    pub session_id: String,
    pub step_id: String,

    /// None means root; a session may hold multiple roots
    pub parent_step_id: Option<String>,

    /// Display sequencing only, NOT an execution-order guarantee
    pub step_order: u32,

    pub status: StepStatus,

    /// Fixed at first entry into `Running`, never rewritten afterwards, so
    /// retried steps report cumulative wall-clock duration
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    pub duration_ms: Option<u64>,

    /// Incremented on each `Error -> Running` re-entry
    pub retry_count: u32,

    pub confidence: Option<f64>,

    /// Opaque structured payloads reported by the pipeline stage
    pub input_data: Option<serde_json::Value>,
    pub output_data: Option<serde_json::Value>,

    pub error_message: Option<String>,
}
