//! Session registry — the subsystem's public API
//!
//! Owns every live and completed-but-unpurged session. The concurrency target
//! is full parallelism across sessions with serialized mutation within one:
//! sessions live in a `DashMap` keyed by id, and each entry is a
//! `tokio::sync::Mutex` over that session's state (session record + step
//! tracker + log sink + transparency recorder).
//!
//! Every mutating call persists through the `StorePort` (awaited, failures
//! surface to the caller) and then enqueues a best-effort change event on the
//! notifier (never awaited, never surfaces). The store write happens while
//! the session lock is held, so a subsequent `get_session` is guaranteed to
//! observe it.

use crate::clock::{Clock, SystemClock};
use crate::error::FlowError;
use crate::logsink::{LogRequest, LogSink};
use crate::metrics;
use crate::model::{
    FlowLogEntry, FlowSession, FlowStep, Metadata, SessionSnapshot, SessionStatus,
    TransparencyRecord, TransparencyUpdate,
};
use crate::notify::NotifierHandle;
use crate::ports::{FlowEvent, StorePort};
use crate::tracker::{StepTracker, StepUpdate};
use crate::transparency::TransparencyRecorder;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Request to open a new tracing session
#[derive(Debug, Clone)]
pub struct StartSession {
    /// Caller-supplied, globally unique
    pub session_id: String,
    pub user_id: String,
    pub query: String,
    pub query_type: String,
    pub conversation_id: Option<String>,
    pub message_id: Option<String>,
    pub metadata: Metadata,
}

impl StartSession {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        query: impl Into<String>,
        query_type: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            query: query.into(),
            query_type: query_type.into(),
            conversation_id: None,
            message_id: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// Request to transition a session to a terminal status
#[derive(Debug, Clone)]
pub struct CompleteSession {
    /// Must be terminal (`Completed`, `Error`, or `Cancelled`)
    pub status: SessionStatus,
    pub generated_artifact: Option<String>,
    pub execution_result: Option<String>,
    pub error_message: Option<String>,
    /// Explicit roll-up; when absent, the mean of completed-step confidences
    /// is used
    pub overall_confidence: Option<f64>,
}

impl CompleteSession {
    pub fn new(status: SessionStatus) -> Self {
        Self {
            status,
            generated_artifact: None,
            execution_result: None,
            error_message: None,
            overall_confidence: None,
        }
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.generated_artifact = Some(artifact.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Mutable state for one session, guarded by the slot mutex
struct SessionState {
    session: FlowSession,
    tracker: StepTracker,
    sink: LogSink,
    recorder: TransparencyRecorder,
}

impl SessionState {
    fn snapshot(&self) -> SessionSnapshot {
        let summary = self.tracker.summary();
        SessionSnapshot {
            session: self.session.clone(),
            steps: self.tracker.steps_sorted(),
            step_counts: summary.counts,
            log_count: self.sink.total(),
            error_log_count: self.sink.error_count(),
            transparency: self.recorder.record().cloned(),
        }
    }
}

type SessionSlot = Arc<Mutex<SessionState>>;

/// Registry of tracing sessions
pub struct SessionRegistry {
    sessions: DashMap<String, SessionSlot>,
    store: Arc<dyn StorePort>,
    notifier: NotifierHandle,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn StorePort>, notifier: NotifierHandle) -> Self {
        Self::with_clock(store, notifier, Arc::new(SystemClock))
    }

    /// Construct with an injected clock (deterministic tests)
    pub fn with_clock(
        store: Arc<dyn StorePort>,
        notifier: NotifierHandle,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            store,
            notifier,
            clock,
        }
    }

    /// Open a new session in `Running` state
    ///
    /// Fails with [`FlowError::DuplicateSession`] if the id is already known.
    pub async fn start_session(&self, request: StartSession) -> Result<FlowSession, FlowError> {
        if request.session_id.is_empty() {
            return Err(FlowError::Validation("session_id must not be empty".into()));
        }
        if request.user_id.is_empty() {
            return Err(FlowError::Validation("user_id must not be empty".into()));
        }

        let now = self.clock.now_millis();
        let session = FlowSession {
            session_id: request.session_id.clone(),
            user_id: request.user_id,
            query: request.query,
            query_type: request.query_type,
            status: SessionStatus::Running,
            start_time: now,
            end_time: None,
            total_duration_ms: None,
            overall_confidence: None,
            generated_artifact: None,
            execution_result: None,
            error_message: None,
            conversation_id: request.conversation_id,
            message_id: request.message_id,
            metadata: request.metadata,
        };

        let slot: SessionSlot = Arc::new(Mutex::new(SessionState {
            session: session.clone(),
            tracker: StepTracker::new(&request.session_id),
            sink: LogSink::new(&request.session_id),
            recorder: TransparencyRecorder::new(&request.session_id),
        }));

        // Hold the (uncontended) session lock across insertion and the first
        // persist so no other call can slip in before the session is durable
        let _guard = slot.clone().lock_owned().await;
        match self.sessions.entry(request.session_id.clone()) {
            Entry::Occupied(_) => {
                return Err(FlowError::DuplicateSession(request.session_id));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
            }
        }

        if let Err(e) = self.persist_session(&session).await {
            self.sessions.remove(&request.session_id);
            return Err(e);
        }

        metrics::record_session_started(&session.query_type);
        self.notifier.publish(FlowEvent::SessionStarted {
            session: session.clone(),
        });
        tracing::info!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            query_type = %session.query_type,
            "Tracing session started"
        );

        Ok(session)
    }

    /// Create or update one step of a live session
    ///
    /// Cascade-skipped descendants are persisted and notified in the same
    /// call.
    pub async fn add_or_update_step(
        &self,
        session_id: &str,
        update: StepUpdate,
    ) -> Result<FlowStep, FlowError> {
        let slot = self.slot(session_id)?;
        let mut state = slot.lock().await;

        if state.session.status.is_terminal() {
            return Err(FlowError::SessionClosed(session_id.to_string()));
        }

        let now = self.clock.now_millis();
        let outcome = state.tracker.upsert(update, now)?;

        self.persist_step(&outcome.step).await?;
        for skipped in &outcome.skipped {
            self.persist_step(skipped).await?;
        }

        metrics::record_step_upserted(&outcome.step.status.to_string());
        self.notifier.publish(FlowEvent::StepChanged {
            session_id: session_id.to_string(),
            step: outcome.step.clone(),
        });
        for skipped in &outcome.skipped {
            self.notifier.publish(FlowEvent::StepChanged {
                session_id: session_id.to_string(),
                step: skipped.clone(),
            });
        }

        tracing::debug!(
            session_id = %session_id,
            step_id = %outcome.step.step_id,
            status = %outcome.step.status,
            skipped = outcome.skipped.len(),
            "Step upserted"
        );

        Ok(outcome.step)
    }

    /// Append a log entry
    ///
    /// Allowed even after the session completed (trailing diagnostics), but
    /// not once the session record has been purged.
    pub async fn log(
        &self,
        session_id: &str,
        request: LogRequest,
    ) -> Result<FlowLogEntry, FlowError> {
        let slot = self.slot(session_id)?;
        let mut state = slot.lock().await;

        let now = self.clock.now_millis();
        let entry = state.sink.append(request, now);

        self.persist_log(&entry).await?;
        self.notifier.publish(FlowEvent::LogAppended {
            entry: entry.clone(),
        });

        Ok(entry)
    }

    /// Record or accumulate the session's AI-usage transparency data
    pub async fn set_transparency(
        &self,
        session_id: &str,
        update: TransparencyUpdate,
    ) -> Result<TransparencyRecord, FlowError> {
        let slot = self.slot(session_id)?;
        let mut state = slot.lock().await;

        if state.session.status.is_terminal() {
            return Err(FlowError::SessionClosed(session_id.to_string()));
        }

        let record = state.recorder.set_or_accumulate(&update);

        self.persist_transparency(&record).await?;
        self.notifier.publish(FlowEvent::TransparencyUpdated {
            record: record.clone(),
        });

        Ok(record)
    }

    /// Transition the session to a terminal status
    ///
    /// Sets `end_time`, computes `total_duration_ms`, and rolls up
    /// `overall_confidence` from completed steps unless an explicit value is
    /// supplied. Subsequent mutation calls are rejected with
    /// [`FlowError::SessionClosed`]; trailing logs stay allowed.
    pub async fn complete_session(
        &self,
        session_id: &str,
        request: CompleteSession,
    ) -> Result<FlowSession, FlowError> {
        if !request.status.is_terminal() {
            return Err(FlowError::Validation(
                "completion status must be terminal".into(),
            ));
        }
        if let Some(confidence) = request.overall_confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(FlowError::Validation(format!(
                    "confidence {} out of range 0.0-1.0",
                    confidence
                )));
            }
        }

        let slot = self.slot(session_id)?;
        let mut state = slot.lock().await;

        if state.session.status.is_terminal() {
            return Err(FlowError::SessionClosed(session_id.to_string()));
        }

        let now = self.clock.now_millis();
        let rolled_up = request
            .overall_confidence
            .or_else(|| state.tracker.summary().mean_confidence());

        state.session.status = request.status;
        state.session.end_time = Some(now);
        state.session.total_duration_ms = Some(now.saturating_sub(state.session.start_time));
        state.session.overall_confidence = rolled_up;
        state.session.generated_artifact = request.generated_artifact;
        state.session.execution_result = request.execution_result;
        state.session.error_message = request.error_message;

        let session = state.session.clone();
        self.persist_session(&session).await?;

        metrics::record_session_completed(
            &session.status.to_string(),
            session.total_duration_ms.unwrap_or(0),
        );
        self.notifier.publish(FlowEvent::SessionCompleted {
            session: session.clone(),
        });
        tracing::info!(
            session_id = %session.session_id,
            status = %session.status,
            duration_ms = session.total_duration_ms.unwrap_or(0),
            "Tracing session completed"
        );

        Ok(session)
    }

    /// Read-only snapshot with computed aggregates
    ///
    /// Falls back to the store for sessions no longer held in memory.
    pub async fn get_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionSnapshot>, FlowError> {
        let slot = self.sessions.get(session_id).map(|e| e.value().clone());
        if let Some(slot) = slot {
            let state = slot.lock().await;
            return Ok(Some(state.snapshot()));
        }

        self.store
            .load_session(session_id)
            .await
            .map_err(FlowError::from)
    }

    /// Drop the session from memory and cascade-delete it from the store
    ///
    /// Returns whether any record existed. After purging, even trailing logs
    /// are rejected with [`FlowError::SessionNotFound`].
    pub async fn purge_session(&self, session_id: &str) -> Result<bool, FlowError> {
        let existed_in_memory = self.sessions.remove(session_id).is_some();
        let existed_in_store = self
            .store
            .delete_session(session_id)
            .await
            .map_err(FlowError::from)?;

        if existed_in_memory || existed_in_store {
            tracing::info!(session_id = %session_id, "Session purged");
        }

        Ok(existed_in_memory || existed_in_store)
    }

    /// Number of sessions currently held in memory
    pub fn resident_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn slot(&self, session_id: &str) -> Result<SessionSlot, FlowError> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))
    }

    async fn persist_session(&self, session: &FlowSession) -> Result<(), FlowError> {
        let start = Instant::now();
        self.store
            .save_session(session)
            .await
            .map_err(FlowError::from)?;
        metrics::record_store_write("save_session", start.elapsed());
        Ok(())
    }

    async fn persist_step(&self, step: &FlowStep) -> Result<(), FlowError> {
        let start = Instant::now();
        self.store.save_step(step).await.map_err(FlowError::from)?;
        metrics::record_store_write("save_step", start.elapsed());
        Ok(())
    }

    async fn persist_log(&self, entry: &FlowLogEntry) -> Result<(), FlowError> {
        let start = Instant::now();
        self.store
            .append_log(entry)
            .await
            .map_err(FlowError::from)?;
        metrics::record_store_write("append_log", start.elapsed());
        Ok(())
    }

    async fn persist_transparency(&self, record: &TransparencyRecord) -> Result<(), FlowError> {
        let start = Instant::now();
        self.store
            .save_transparency(record)
            .await
            .map_err(FlowError::from)?;
        metrics::record_store_write("save_transparency", start.elapsed());
        Ok(())
    }
}
