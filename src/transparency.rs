//! Per-session transparency recorder
//!
//! Wraps the at-most-one [`TransparencyRecord`] for a session and applies the
//! sum-vs-overwrite merge on repeated `set_transparency` calls.

use crate::model::{TransparencyRecord, TransparencyUpdate};

pub struct TransparencyRecorder {
    session_id: String,
    record: Option<TransparencyRecord>,
}

impl TransparencyRecorder {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            record: None,
        }
    }

    /// Create the record on first call, accumulate on later ones
    pub fn set_or_accumulate(&mut self, update: &TransparencyUpdate) -> TransparencyRecord {
        match &mut self.record {
            Some(record) => {
                record.accumulate(update);
                record.clone()
            }
            None => {
                let record = TransparencyRecord::from_update(self.session_id.clone(), update);
                self.record = Some(record.clone());
                record
            }
        }
    }

    pub fn record(&self) -> Option<&TransparencyRecord> {
        self.record.as_ref()
    }
}
