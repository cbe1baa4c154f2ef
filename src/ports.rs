//! External collaborator contracts
//!
//! The core's boundary is two narrow interfaces: [`StorePort`] for durable
//! persistence and [`NotifierPort`] for best-effort live delivery. Store
//! writes are awaited before a mutating call returns; notifier delivery is
//! at-most-once and never retried.

use crate::model::{
    FlowLogEntry, FlowSession, FlowStep, SessionSnapshot, TransparencyRecord,
};
use async_trait::async_trait;
use serde::Serialize;

/// Change event emitted after each successful mutation
///
/// `LogAppended` is high-volume; notifier implementations may sample or drop
/// it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    SessionStarted { session: FlowSession },
    StepChanged { session_id: String, step: FlowStep },
    LogAppended { entry: FlowLogEntry },
    TransparencyUpdated { record: TransparencyRecord },
    SessionCompleted { session: FlowSession },
}

impl FlowEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionStarted { session } | Self::SessionCompleted { session } => {
                &session.session_id
            }
            Self::StepChanged { session_id, .. } => session_id,
            Self::LogAppended { entry } => &entry.session_id,
            Self::TransparencyUpdated { record } => &record.session_id,
        }
    }

    /// Short event name for logs and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::StepChanged { .. } => "step_changed",
            Self::LogAppended { .. } => "log_appended",
            Self::TransparencyUpdated { .. } => "transparency_updated",
            Self::SessionCompleted { .. } => "session_completed",
        }
    }
}

/// Durable persistence behind the registry
///
/// Every write has upsert semantics keyed by the record's identity
/// (`session_id`, `(session_id, step_id)`, `entry_id`, `session_id`). The
/// core treats each write as fire-and-confirm: it is awaited before the
/// mutating API returns, and retry policy belongs to the implementation.
/// Deleting a session must cascade to its steps, logs, and transparency
/// record.
#[async_trait]
pub trait StorePort: Send + Sync + 'static {
    async fn save_session(&self, session: &FlowSession) -> anyhow::Result<()>;

    async fn save_step(&self, step: &FlowStep) -> anyhow::Result<()>;

    async fn append_log(&self, entry: &FlowLogEntry) -> anyhow::Result<()>;

    async fn save_transparency(&self, record: &TransparencyRecord) -> anyhow::Result<()>;

    /// Cold read for sessions no longer held in memory
    async fn load_session(&self, session_id: &str) -> anyhow::Result<Option<SessionSnapshot>>;

    /// Remove the session and everything keyed under it; returns whether a
    /// session record existed
    async fn delete_session(&self, session_id: &str) -> anyhow::Result<bool>;
}

/// Best-effort change delivery (live dashboards, websocket push, ...)
///
/// Failures are logged and swallowed by the dispatcher — they never surface
/// to the pipeline stage that triggered the event.
#[async_trait]
pub trait NotifierPort: Send + Sync + 'static {
    async fn notify(&self, event: &FlowEvent) -> anyhow::Result<()>;
}
