//! Per-session step tracker
//!
//! Owns the step forest for one live session and enforces the state machine
//! and hierarchy invariants. The forest is an arena (`step_id -> FlowStep`)
//! plus an adjacency index (`parent_step_id -> children`), rebuilt
//! incrementally; snapshots stay cheap and there are no ownership cycles.
//!
//! The tracker itself is not synchronized: the owning registry serializes all
//! access behind the session's lock.

use crate::error::FlowError;
use crate::model::{FlowStep, StepCounts, StepStatus};
use std::collections::HashMap;

/// Upsert payload for one step
///
/// The first call with a given `step_id` creates the step; later calls merge
/// fields. `parent_step_id` is fixed at creation — `None` on an update means
/// "unchanged", and supplying a different parent is rejected.
#[derive(Debug, Clone)]
pub struct StepUpdate {
    pub step_id: String,
    pub parent_step_id: Option<String>,
    pub status: StepStatus,

    /// Display order; assigned sequentially when not supplied at creation
    pub step_order: Option<u32>,

    pub confidence: Option<f64>,
    pub input_data: Option<serde_json::Value>,
    pub output_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

impl StepUpdate {
    /// Minimal update: just a step id and a requested status
    pub fn new(step_id: impl Into<String>, status: StepStatus) -> Self {
        Self {
            step_id: step_id.into(),
            parent_step_id: None,
            status,
            step_order: None,
            confidence: None,
            input_data: None,
            output_data: None,
            error_message: None,
        }
    }

    pub fn with_parent(mut self, parent_step_id: impl Into<String>) -> Self {
        self.parent_step_id = Some(parent_step_id.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Result of one upsert: the touched step plus any cascade-skipped descendants
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub step: FlowStep,
    pub skipped: Vec<FlowStep>,
}

/// `(step_id, duration_ms, confidence)` for one completed step
#[derive(Debug, Clone)]
pub struct CompletedStep {
    pub step_id: String,
    pub duration_ms: Option<u64>,
    pub confidence: Option<f64>,
}

/// Aggregate view over the session's steps
#[derive(Debug, Clone, Default)]
pub struct StepSummary {
    pub counts: StepCounts,
    pub completed: Vec<CompletedStep>,
}

impl StepSummary {
    /// Arithmetic mean of completed-step confidences, None if none reported
    pub fn mean_confidence(&self) -> Option<f64> {
        let reported: Vec<f64> = self.completed.iter().filter_map(|s| s.confidence).collect();
        if reported.is_empty() {
            return None;
        }
        Some(reported.iter().sum::<f64>() / reported.len() as f64)
    }
}

/// Step forest for one session
pub struct StepTracker {
    session_id: String,
    steps: HashMap<String, FlowStep>,
    children: HashMap<String, Vec<String>>,
    next_order: u32,
}

impl StepTracker {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            steps: HashMap::new(),
            children: HashMap::new(),
            next_order: 0,
        }
    }

    /// Create or update one step
    ///
    /// Creation accepts any initial status (pipeline stages may report a stage
    /// as a single terminal upsert) after validating the parent reference.
    /// Updates must follow the state machine; illegal transitions leave the
    /// step unchanged. Terminating in `Error` or `Cancelled` cascades
    /// `Skipped` to every Pending descendant, returned in the outcome so the
    /// caller can persist and notify them.
    pub fn upsert(&mut self, update: StepUpdate, now: u64) -> Result<UpsertOutcome, FlowError> {
        if update.step_id.is_empty() {
            return Err(FlowError::Validation("step_id must not be empty".into()));
        }
        if let Some(confidence) = update.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(FlowError::Validation(format!(
                    "confidence {} out of range 0.0-1.0",
                    confidence
                )));
            }
        }

        let step = if self.steps.contains_key(&update.step_id) {
            self.apply_update(&update, now)?
        } else {
            self.create_step(&update, now)?
        };

        let skipped = if step.status == StepStatus::Error || step.status == StepStatus::Cancelled {
            self.cascade_skip(&step.step_id, now)
        } else {
            Vec::new()
        };

        Ok(UpsertOutcome { step, skipped })
    }

    fn create_step(&mut self, update: &StepUpdate, now: u64) -> Result<FlowStep, FlowError> {
        if let Some(parent) = &update.parent_step_id {
            if parent == &update.step_id {
                return Err(FlowError::Validation(format!(
                    "step '{}' cannot be its own parent",
                    update.step_id
                )));
            }
            // No forward references: the parent must already exist
            if !self.steps.contains_key(parent) {
                return Err(FlowError::Validation(format!(
                    "parent step '{}' does not exist in session '{}'",
                    parent, self.session_id
                )));
            }
        }

        let status = update.status;
        let start_time = if status == StepStatus::Pending {
            None
        } else {
            Some(now)
        };
        let (end_time, duration_ms) = if status.is_terminal() {
            (Some(now), Some(0))
        } else {
            (None, None)
        };

        let step_order = update.step_order.unwrap_or(self.next_order);
        self.next_order = self.next_order.max(step_order + 1);

        let step = FlowStep {
            session_id: self.session_id.clone(),
            step_id: update.step_id.clone(),
            parent_step_id: update.parent_step_id.clone(),
            step_order,
            status,
            start_time,
            end_time,
            duration_ms,
            retry_count: 0,
            confidence: update.confidence,
            input_data: update.input_data.clone(),
            output_data: update.output_data.clone(),
            error_message: update.error_message.clone(),
        };

        if let Some(parent) = &step.parent_step_id {
            self.children
                .entry(parent.clone())
                .or_default()
                .push(step.step_id.clone());
        }
        self.steps.insert(step.step_id.clone(), step.clone());

        Ok(step)
    }

    fn apply_update(&mut self, update: &StepUpdate, now: u64) -> Result<FlowStep, FlowError> {
        // Validate against a read-only view first so a rejected transition
        // leaves the step untouched
        let current = &self.steps[&update.step_id];

        if let Some(parent) = &update.parent_step_id {
            if current.parent_step_id.as_deref() != Some(parent.as_str()) {
                return Err(FlowError::Validation(format!(
                    "parent of step '{}' cannot be changed after creation",
                    update.step_id
                )));
            }
        }

        let from = current.status;
        let to = update.status;
        if !from.can_transition_to(to) {
            return Err(FlowError::InvalidStepTransition {
                step_id: update.step_id.clone(),
                from,
                to,
            });
        }

        let step = self.steps.get_mut(&update.step_id).expect("checked above");

        if from != to {
            step.status = to;
            match to {
                StepStatus::Running => {
                    // First entry into Running fixes start_time for good;
                    // a retry re-opens the step but keeps the original start
                    if step.start_time.is_none() {
                        step.start_time = Some(now);
                    }
                    if from == StepStatus::Error {
                        step.retry_count += 1;
                        step.end_time = None;
                        step.duration_ms = None;
                    }
                }
                _ if to.is_terminal() => {
                    step.end_time = Some(now);
                    step.duration_ms = step.start_time.map(|start| now.saturating_sub(start));
                }
                _ => {}
            }
        }

        if update.confidence.is_some() {
            step.confidence = update.confidence;
        }
        if update.input_data.is_some() {
            step.input_data = update.input_data.clone();
        }
        if update.output_data.is_some() {
            step.output_data = update.output_data.clone();
        }
        if update.error_message.is_some() {
            step.error_message = update.error_message.clone();
        }

        Ok(step.clone())
    }

    /// Transition every Pending descendant of `step_id` to Skipped
    ///
    /// Running descendants are left alone: in-flight work may still complete
    /// independently, and this subsystem never preempts it.
    fn cascade_skip(&mut self, step_id: &str, now: u64) -> Vec<FlowStep> {
        let mut skipped = Vec::new();
        let mut stack: Vec<String> = self.children.get(step_id).cloned().unwrap_or_default();

        while let Some(child_id) = stack.pop() {
            if let Some(grandchildren) = self.children.get(&child_id) {
                stack.extend(grandchildren.iter().cloned());
            }
            if let Some(child) = self.steps.get_mut(&child_id) {
                if child.status == StepStatus::Pending {
                    child.status = StepStatus::Skipped;
                    child.end_time = Some(now);
                    skipped.push(child.clone());
                }
            }
        }

        skipped
    }

    pub fn get(&self, step_id: &str) -> Option<&FlowStep> {
        self.steps.get(step_id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps sorted by display order (then id, for a stable tiebreak)
    pub fn steps_sorted(&self) -> Vec<FlowStep> {
        let mut steps: Vec<FlowStep> = self.steps.values().cloned().collect();
        steps.sort_by(|a, b| {
            a.step_order
                .cmp(&b.step_order)
                .then_with(|| a.step_id.cmp(&b.step_id))
        });
        steps
    }

    /// Counts per status plus the completed-step list for confidence roll-up
    pub fn summary(&self) -> StepSummary {
        let mut summary = StepSummary::default();
        for step in self.steps.values() {
            summary.counts.record(step.status);
            if step.status == StepStatus::Completed {
                summary.completed.push(CompletedStep {
                    step_id: step.step_id.clone(),
                    duration_ms: step.duration_ms,
                    confidence: step.confidence,
                });
            }
        }
        summary
    }
}
