//! Process-flow tracing for multi-step AI query pipelines
//!
//! Records each pipeline invocation (authentication, semantic analysis,
//! schema retrieval, prompt construction, model invocation, SQL validation)
//! as a session of hierarchical steps with timing, confidence, structured
//! logs, and AI-usage transparency metrics.
//!
//! ## Architecture
//!
//! ```text
//! Pipeline stages
//!     ↓  (start_session / add_or_update_step / log / set_transparency / complete_session)
//! SessionRegistry  —  per-session serialized state (step tracker, log sink, transparency)
//!     ↓ awaited                    ↓ fire-and-forget
//! StorePort (SQLite / memory)   NotifierPort fan-out (bounded drop-oldest queue)
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod logsink;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod ports;
pub mod registry;
pub mod store;
pub mod tracker;
pub mod transparency;

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// Note: This function can only be called once per process; embedding
/// applications that already install a subscriber should skip it.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Assemble the full tracing stack from configuration
///
/// Connects the SQLite store, spawns the retention cleanup task (if enabled)
/// and the notification dispatcher, and returns the registry. Embedders that
/// want a different store or clock wire the pieces up themselves.
pub async fn build_registry(
    config: &config::FlowTraceConfig,
    sinks: Vec<Arc<dyn ports::NotifierPort>>,
) -> anyhow::Result<Arc<registry::SessionRegistry>> {
    metrics::describe_metrics();

    let store = Arc::new(store::SqliteStore::new(&config.store.database_url).await?);

    if config.cleanup.enabled {
        store::spawn_cleanup_task(
            store.clone(),
            store::CleanupConfig {
                ttl_days: config.cleanup.ttl_days,
                cleanup_hour: config.cleanup.cleanup_hour,
                check_interval: Duration::from_secs(config.cleanup.check_interval_seconds),
            },
        );
    }

    let notifier = notify::NotifierHandle::spawn(sinks, config.notifier.queue_capacity);

    Ok(Arc::new(registry::SessionRegistry::new(store, notifier)))
}
