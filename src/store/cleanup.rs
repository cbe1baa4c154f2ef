//! Background retention cleanup
//!
//! Periodically purges terminal sessions older than the TTL; the foreign-key
//! cascade removes their steps, logs, and transparency records together.

use super::sqlite::SqliteStore;
use crate::clock::current_millis;
use anyhow::Result;
use chrono::{Datelike, Timelike};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

const MILLIS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// Cleanup configuration
#[derive(Debug, Clone, Copy)]
pub struct CleanupConfig {
    /// Terminal sessions older than this are purged
    pub ttl_days: i64,

    /// Hour of day to run cleanup (0-23)
    pub cleanup_hour: u32,

    /// Check interval (how often to check if it's cleanup time)
    pub check_interval: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            ttl_days: 30,
            cleanup_hour: 3, // 3 AM by default
            check_interval: Duration::from_secs(3600),
        }
    }
}

/// Spawn background cleanup task
///
/// # Example
///
/// ```ignore
/// let config = CleanupConfig {
///     ttl_days: 30,
///     cleanup_hour: 3,
///     check_interval: Duration::from_secs(3600),
/// };
/// spawn_cleanup_task(store.clone(), config);
/// ```
pub fn spawn_cleanup_task(
    store: Arc<SqliteStore>,
    config: CleanupConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        cleanup_loop(store, config).await;
    })
}

async fn cleanup_loop(store: Arc<SqliteStore>, config: CleanupConfig) {
    let mut interval = time::interval(config.check_interval);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
    let mut last_cleanup_day: Option<u32> = None;

    loop {
        interval.tick().await;

        let now = chrono::Local::now();
        let current_hour = now.hour();
        let current_day = now.ordinal();

        if current_hour == config.cleanup_hour && Some(current_day) != last_cleanup_day {
            tracing::info!(
                cleanup_hour = config.cleanup_hour,
                ttl_days = config.ttl_days,
                "Starting scheduled session cleanup"
            );

            match run_cleanup_now(&store, config.ttl_days).await {
                Ok(purged) => {
                    tracing::info!(sessions_purged = purged, "Cleanup completed");
                    last_cleanup_day = Some(current_day);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Cleanup failed");
                }
            }
        }
    }
}

/// Run cleanup immediately (for manual triggering)
///
/// Returns the number of sessions purged.
pub async fn run_cleanup_now(store: &SqliteStore, ttl_days: i64) -> Result<u64> {
    let cutoff = current_millis().saturating_sub(ttl_days as u64 * MILLIS_PER_DAY);

    let purged = store.purge_expired(cutoff).await?;
    if purged > 0 {
        store.vacuum().await?;
    }

    tracing::info!(
        sessions_purged = purged,
        ttl_days = ttl_days,
        "Session cleanup pass finished"
    );

    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FlowSession, SessionStatus};
    use crate::ports::StorePort;

    fn terminal_session(id: &str, end_time: u64) -> FlowSession {
        FlowSession {
            session_id: id.to_string(),
            user_id: "u1".to_string(),
            query: "q".to_string(),
            query_type: "sql_generation".to_string(),
            status: SessionStatus::Completed,
            start_time: end_time.saturating_sub(100),
            end_time: Some(end_time),
            total_duration_ms: Some(100),
            overall_confidence: None,
            generated_artifact: None,
            execution_result: None,
            error_message: None,
            conversation_id: None,
            message_id: None,
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_run_cleanup_now() {
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();

        // Ancient terminal session, and a recent one
        store
            .save_session(&terminal_session("old", 1_000))
            .await
            .unwrap();
        store
            .save_session(&terminal_session("recent", current_millis()))
            .await
            .unwrap();

        let purged = run_cleanup_now(&store, 7).await.unwrap();

        assert_eq!(purged, 1);
        assert!(store.load_session("old").await.unwrap().is_none());
        assert!(store.load_session("recent").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cleanup_config_default() {
        let config = CleanupConfig::default();
        assert_eq!(config.ttl_days, 30);
        assert_eq!(config.cleanup_hour, 3);
        assert_eq!(config.check_interval, Duration::from_secs(3600));
    }
}
