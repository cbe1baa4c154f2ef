//! Store adapters
//!
//! Two [`StorePort`](crate::ports::StorePort) implementations: an in-memory
//! reference store for tests and database-free embedding, and a SQLite store
//! built on sqlx with WAL mode and migration-managed schema. Retention
//! housekeeping for the SQLite store lives in [`cleanup`].

pub mod cleanup;
pub mod memory;
pub mod sqlite;

pub use cleanup::{run_cleanup_now, spawn_cleanup_task, CleanupConfig};
pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, StoreStats};
