//! In-memory store
//!
//! Reference `StorePort` implementation mirroring the four record sets as
//! concurrent maps. Used by the test suite and by embedders that want tracing
//! without a database.

use crate::model::{
    FlowLogEntry, FlowSession, FlowStep, LogLevel, SessionSnapshot, StepCounts,
    TransparencyRecord,
};
use crate::ports::StorePort;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryStore {
    sessions: DashMap<String, FlowSession>,
    steps: DashMap<String, HashMap<String, FlowStep>>,
    logs: DashMap<String, Vec<FlowLogEntry>>,
    transparency: DashMap<String, TransparencyRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn step_count(&self, session_id: &str) -> usize {
        self.steps.get(session_id).map(|s| s.len()).unwrap_or(0)
    }

    pub fn log_count(&self, session_id: &str) -> usize {
        self.logs.get(session_id).map(|l| l.len()).unwrap_or(0)
    }
}

#[async_trait]
impl StorePort for MemoryStore {
    async fn save_session(&self, session: &FlowSession) -> anyhow::Result<()> {
        self.sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn save_step(&self, step: &FlowStep) -> anyhow::Result<()> {
        self.steps
            .entry(step.session_id.clone())
            .or_default()
            .insert(step.step_id.clone(), step.clone());
        Ok(())
    }

    async fn append_log(&self, entry: &FlowLogEntry) -> anyhow::Result<()> {
        self.logs
            .entry(entry.session_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn save_transparency(&self, record: &TransparencyRecord) -> anyhow::Result<()> {
        self.transparency
            .insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> anyhow::Result<Option<SessionSnapshot>> {
        let Some(session) = self.sessions.get(session_id).map(|s| s.value().clone()) else {
            return Ok(None);
        };

        let mut steps: Vec<FlowStep> = self
            .steps
            .get(session_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        steps.sort_by(|a, b| {
            a.step_order
                .cmp(&b.step_order)
                .then_with(|| a.step_id.cmp(&b.step_id))
        });

        let mut step_counts = StepCounts::default();
        for step in &steps {
            step_counts.record(step.status);
        }

        let (log_count, error_log_count) = self
            .logs
            .get(session_id)
            .map(|entries| {
                let errors = entries
                    .iter()
                    .filter(|e| e.level == LogLevel::Error)
                    .count() as u64;
                (entries.len() as u64, errors)
            })
            .unwrap_or((0, 0));

        Ok(Some(SessionSnapshot {
            session,
            steps,
            step_counts,
            log_count,
            error_log_count,
            transparency: self.transparency.get(session_id).map(|t| t.value().clone()),
        }))
    }

    async fn delete_session(&self, session_id: &str) -> anyhow::Result<bool> {
        let existed = self.sessions.remove(session_id).is_some();
        // Cascade regardless, mirroring the foreign-key behavior of the
        // durable store
        self.steps.remove(session_id);
        self.logs.remove(session_id);
        self.transparency.remove(session_id);
        Ok(existed)
    }
}
