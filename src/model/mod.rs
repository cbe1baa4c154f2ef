//! Core data model
//!
//! The four persisted entity types (session, step, log entry, transparency
//! record) plus the typed metadata map and the read-side snapshot. All
//! timestamps are Unix milliseconds; serialization to storage formats happens
//! only in store adapters.

pub mod log;
pub mod session;
pub mod step;
pub mod transparency;
pub mod value;

pub use log::{FlowLogEntry, LogLevel};
pub use session::{FlowSession, SessionSnapshot, SessionStatus, StepCounts};
pub use step::{FlowStep, StepStatus};
pub use transparency::{TransparencyRecord, TransparencyUpdate};
pub use value::{MetaValue, Metadata};
