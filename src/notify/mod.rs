//! Outbound notification dispatch
//!
//! Change events are queued on a bounded, non-blocking queue and drained by a
//! background task that fans them out to every registered [`NotifierPort`].
//! When the queue is full the oldest pending event is dropped rather than
//! blocking the tracing call.

pub mod dispatcher;

pub use dispatcher::NotifierHandle;
