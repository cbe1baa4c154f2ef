//! SQLite store adapter
//!
//! Durable `StorePort` implementation with:
//! - Connection pooling
//! - Automatic migrations
//! - WAL mode for concurrent reads/writes
//! - Foreign-key cascade so a purged session takes its steps, logs, and
//!   transparency record with it

use crate::model::{
    FlowLogEntry, FlowSession, FlowStep, SessionSnapshot, StepCounts, TransparencyRecord,
};
use crate::ports::StorePort;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;

/// SQLite-backed store handle
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and migrate
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite database URL (e.g., "sqlite:./data/flow_trace.db")
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = SqliteStore::new("sqlite:./data/flow_trace.db").await?;
    /// ```
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30))
            .pragma("cache_size", "-64000")
            .pragma("temp_store", "memory")
            .pragma("synchronous", "NORMAL");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .context("Failed to connect to flow-trace database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run flow-trace database migrations")?;

        Ok(Self { pool })
    }

    /// Per-table record counts
    pub async fn stats(&self) -> Result<StoreStats> {
        let session_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flow_sessions")
            .fetch_one(&self.pool)
            .await?;
        let step_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flow_steps")
            .fetch_one(&self.pool)
            .await?;
        let log_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flow_logs")
            .fetch_one(&self.pool)
            .await?;
        let transparency_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flow_transparency")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            session_count: session_count as u64,
            step_count: step_count as u64,
            log_count: log_count as u64,
            transparency_count: transparency_count as u64,
        })
    }

    /// Delete terminal sessions whose `end_time` is before `cutoff_millis`
    ///
    /// Children go with them via the foreign-key cascade. Returns the number
    /// of sessions removed.
    pub async fn purge_expired(&self, cutoff_millis: u64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM flow_sessions
             WHERE status != 'running' AND end_time IS NOT NULL AND end_time < ?",
        )
        .bind(cutoff_millis as i64)
        .execute(&self.pool)
        .await
        .context("Failed to purge expired sessions")?;

        Ok(result.rows_affected())
    }

    /// VACUUM to reclaim disk space after a purge
    pub async fn vacuum(&self) -> Result<()> {
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to VACUUM database")?;
        Ok(())
    }

    /// Get the underlying connection pool (for advanced usage)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_steps(&self, session_id: &str) -> Result<Vec<FlowStep>> {
        let rows = sqlx::query(
            "SELECT session_id, step_id, parent_step_id, step_order, status,
                    start_time, end_time, duration_ms, retry_count, confidence,
                    input_data, output_data, error_message
             FROM flow_steps
             WHERE session_id = ?
             ORDER BY step_order ASC, step_id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(FlowStep {
                    session_id: row.get("session_id"),
                    step_id: row.get("step_id"),
                    parent_step_id: row.get("parent_step_id"),
                    step_order: row.get::<i64, _>("step_order") as u32,
                    status: parse_enum(row.get::<String, _>("status"))?,
                    start_time: row.get::<Option<i64>, _>("start_time").map(|t| t as u64),
                    end_time: row.get::<Option<i64>, _>("end_time").map(|t| t as u64),
                    duration_ms: row.get::<Option<i64>, _>("duration_ms").map(|d| d as u64),
                    retry_count: row.get::<i64, _>("retry_count") as u32,
                    confidence: row.get("confidence"),
                    input_data: parse_json_column(row.get("input_data"))?,
                    output_data: parse_json_column(row.get("output_data"))?,
                    error_message: row.get("error_message"),
                })
            })
            .collect()
    }
}

#[async_trait]
impl StorePort for SqliteStore {
    async fn save_session(&self, session: &FlowSession) -> Result<()> {
        let metadata = serde_json::to_string(&session.metadata)
            .context("Failed to serialize session metadata")?;

        sqlx::query(
            "INSERT INTO flow_sessions (
                session_id, user_id, query_text, query_type, status,
                start_time, end_time, total_duration_ms, overall_confidence,
                generated_artifact, execution_result, error_message,
                conversation_id, message_id, metadata
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET
                status = excluded.status,
                end_time = excluded.end_time,
                total_duration_ms = excluded.total_duration_ms,
                overall_confidence = excluded.overall_confidence,
                generated_artifact = excluded.generated_artifact,
                execution_result = excluded.execution_result,
                error_message = excluded.error_message,
                metadata = excluded.metadata",
        )
        .bind(&session.session_id)
        .bind(&session.user_id)
        .bind(&session.query)
        .bind(&session.query_type)
        .bind(session.status.to_string())
        .bind(session.start_time as i64)
        .bind(session.end_time.map(|t| t as i64))
        .bind(session.total_duration_ms.map(|d| d as i64))
        .bind(session.overall_confidence)
        .bind(&session.generated_artifact)
        .bind(&session.execution_result)
        .bind(&session.error_message)
        .bind(&session.conversation_id)
        .bind(&session.message_id)
        .bind(&metadata)
        .execute(&self.pool)
        .await
        .context("Failed to save session")?;

        Ok(())
    }

    async fn save_step(&self, step: &FlowStep) -> Result<()> {
        let input_data = encode_json_column(&step.input_data)?;
        let output_data = encode_json_column(&step.output_data)?;

        sqlx::query(
            "INSERT INTO flow_steps (
                session_id, step_id, parent_step_id, step_order, status,
                start_time, end_time, duration_ms, retry_count, confidence,
                input_data, output_data, error_message
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_id, step_id) DO UPDATE SET
                status = excluded.status,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                duration_ms = excluded.duration_ms,
                retry_count = excluded.retry_count,
                confidence = excluded.confidence,
                input_data = excluded.input_data,
                output_data = excluded.output_data,
                error_message = excluded.error_message",
        )
        .bind(&step.session_id)
        .bind(&step.step_id)
        .bind(&step.parent_step_id)
        .bind(step.step_order as i64)
        .bind(step.status.to_string())
        .bind(step.start_time.map(|t| t as i64))
        .bind(step.end_time.map(|t| t as i64))
        .bind(step.duration_ms.map(|d| d as i64))
        .bind(step.retry_count as i64)
        .bind(step.confidence)
        .bind(&input_data)
        .bind(&output_data)
        .bind(&step.error_message)
        .execute(&self.pool)
        .await
        .context("Failed to save step")?;

        Ok(())
    }

    async fn append_log(&self, entry: &FlowLogEntry) -> Result<()> {
        let details = encode_json_column(&entry.details)?;

        sqlx::query(
            "INSERT INTO flow_logs (
                entry_id, session_id, step_id, level, message,
                details, exception, source, timestamp
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.entry_id.to_string())
        .bind(&entry.session_id)
        .bind(&entry.step_id)
        .bind(entry.level.to_string())
        .bind(&entry.message)
        .bind(&details)
        .bind(&entry.exception)
        .bind(&entry.source)
        .bind(entry.timestamp as i64)
        .execute(&self.pool)
        .await
        .context("Failed to append log entry")?;

        Ok(())
    }

    async fn save_transparency(&self, record: &TransparencyRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO flow_transparency (
                session_id, model, temperature, max_tokens,
                prompt_tokens, completion_tokens, total_tokens, estimated_cost,
                confidence, ai_processing_time_ms, api_call_count
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET
                model = excluded.model,
                temperature = excluded.temperature,
                max_tokens = excluded.max_tokens,
                prompt_tokens = excluded.prompt_tokens,
                completion_tokens = excluded.completion_tokens,
                total_tokens = excluded.total_tokens,
                estimated_cost = excluded.estimated_cost,
                confidence = excluded.confidence,
                ai_processing_time_ms = excluded.ai_processing_time_ms,
                api_call_count = excluded.api_call_count",
        )
        .bind(&record.session_id)
        .bind(&record.model)
        .bind(record.temperature)
        .bind(record.max_tokens.map(|t| t as i64))
        .bind(record.prompt_tokens as i64)
        .bind(record.completion_tokens as i64)
        .bind(record.total_tokens as i64)
        .bind(record.estimated_cost)
        .bind(record.confidence)
        .bind(record.ai_processing_time_ms.map(|t| t as i64))
        .bind(record.api_call_count as i64)
        .execute(&self.pool)
        .await
        .context("Failed to save transparency record")?;

        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<SessionSnapshot>> {
        let row = sqlx::query(
            "SELECT session_id, user_id, query_text, query_type, status,
                    start_time, end_time, total_duration_ms, overall_confidence,
                    generated_artifact, execution_result, error_message,
                    conversation_id, message_id, metadata
             FROM flow_sessions
             WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let metadata: String = row.get("metadata");
        let session = FlowSession {
            session_id: row.get("session_id"),
            user_id: row.get("user_id"),
            query: row.get("query_text"),
            query_type: row.get("query_type"),
            status: parse_enum(row.get::<String, _>("status"))?,
            start_time: row.get::<i64, _>("start_time") as u64,
            end_time: row.get::<Option<i64>, _>("end_time").map(|t| t as u64),
            total_duration_ms: row
                .get::<Option<i64>, _>("total_duration_ms")
                .map(|d| d as u64),
            overall_confidence: row.get("overall_confidence"),
            generated_artifact: row.get("generated_artifact"),
            execution_result: row.get("execution_result"),
            error_message: row.get("error_message"),
            conversation_id: row.get("conversation_id"),
            message_id: row.get("message_id"),
            metadata: serde_json::from_str(&metadata)
                .context("Failed to parse session metadata")?,
        };

        let steps = self.load_steps(session_id).await?;
        let mut step_counts = StepCounts::default();
        for step in &steps {
            step_counts.record(step.status);
        }

        let log_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM flow_logs WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;
        let error_log_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM flow_logs WHERE session_id = ? AND level = 'error'",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        let transparency = sqlx::query(
            "SELECT session_id, model, temperature, max_tokens,
                    prompt_tokens, completion_tokens, total_tokens, estimated_cost,
                    confidence, ai_processing_time_ms, api_call_count
             FROM flow_transparency
             WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| TransparencyRecord {
            session_id: row.get("session_id"),
            model: row.get("model"),
            temperature: row.get("temperature"),
            max_tokens: row.get::<Option<i64>, _>("max_tokens").map(|t| t as u32),
            prompt_tokens: row.get::<i64, _>("prompt_tokens") as u64,
            completion_tokens: row.get::<i64, _>("completion_tokens") as u64,
            total_tokens: row.get::<i64, _>("total_tokens") as u64,
            estimated_cost: row.get("estimated_cost"),
            confidence: row.get("confidence"),
            ai_processing_time_ms: row
                .get::<Option<i64>, _>("ai_processing_time_ms")
                .map(|t| t as u64),
            api_call_count: row.get::<i64, _>("api_call_count") as u32,
        });

        Ok(Some(SessionSnapshot {
            session,
            steps,
            step_counts,
            log_count: log_count as u64,
            error_log_count: error_log_count as u64,
            transparency,
        }))
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM flow_sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete session")?;

        Ok(result.rows_affected() > 0)
    }
}

/// Per-table record counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub session_count: u64,
    pub step_count: u64,
    pub log_count: u64,
    pub transparency_count: u64,
}

fn parse_enum<T>(raw: String) -> Result<T>
where
    T: FromStr<Err = String>,
{
    raw.parse().map_err(|e: String| anyhow::anyhow!(e))
}

fn parse_json_column(raw: Option<String>) -> Result<Option<serde_json::Value>> {
    raw.map(|s| serde_json::from_str(&s).context("Failed to parse JSON column"))
        .transpose()
}

fn encode_json_column(value: &Option<serde_json::Value>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(|v| serde_json::to_string(v).context("Failed to encode JSON column"))
        .transpose()
}
