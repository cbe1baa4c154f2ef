//! Error taxonomy for the tracing core
//!
//! Every failure mode is a typed, returned value. The one exception is
//! notifier delivery: those failures are logged and swallowed so that tracing
//! never fails the pipeline it observes.

use crate::model::StepStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    /// Invalid hierarchy, malformed identifier, or bad request payload.
    /// Never persisted as a partial write.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Requested step status is not reachable from the current one
    #[error("illegal step transition for '{step_id}': {from} -> {to}")]
    InvalidStepTransition {
        step_id: String,
        from: StepStatus,
        to: StepStatus,
    },

    /// `start_session` called with an id that already exists
    #[error("session '{0}' already exists")]
    DuplicateSession(String),

    /// Unknown session id (never started, or already purged)
    #[error("session '{0}' not found")]
    SessionNotFound(String),

    /// Mutation attempted on a terminal session
    #[error("session '{0}' is closed")]
    SessionClosed(String),

    /// The store failed; surfaced to the caller because silently losing a
    /// tracing write would corrupt the audit trail
    #[error("persistence failed: {0:#}")]
    Persistence(anyhow::Error),
}

impl From<anyhow::Error> for FlowError {
    fn from(err: anyhow::Error) -> Self {
        Self::Persistence(err)
    }
}
