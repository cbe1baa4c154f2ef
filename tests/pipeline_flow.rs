/// End-to-end tracing flows against the in-memory and SQLite stores
use flow_trace::clock::ManualClock;
use flow_trace::error::FlowError;
use flow_trace::logsink::LogRequest;
use flow_trace::model::{LogLevel, MetaValue, SessionStatus, StepStatus, TransparencyUpdate};
use flow_trace::notify::NotifierHandle;
use flow_trace::ports::{FlowEvent, NotifierPort};
use flow_trace::registry::{CompleteSession, SessionRegistry, StartSession};
use flow_trace::store::{MemoryStore, SqliteStore};
use flow_trace::tracker::StepUpdate;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct RecordingNotifier {
    kinds: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            kinds: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<String> {
        self.kinds.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifierPort for RecordingNotifier {
    async fn notify(&self, event: &FlowEvent) -> anyhow::Result<()> {
        self.kinds.lock().unwrap().push(event.kind().to_string());
        Ok(())
    }
}

fn test_registry() -> (SessionRegistry, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let registry = SessionRegistry::with_clock(
        Arc::new(MemoryStore::new()),
        NotifierHandle::disabled(),
        clock.clone(),
    );
    (registry, clock)
}

#[tokio::test]
async fn test_full_pipeline_scenario() {
    let (registry, clock) = test_registry();

    registry
        .start_session(StartSession::new(
            "s1",
            "u1",
            "find top 10 players",
            "sql_generation",
        ))
        .await
        .unwrap();

    clock.advance(50);
    registry
        .add_or_update_step("s1", StepUpdate::new("auth", StepStatus::Completed))
        .await
        .unwrap();

    clock.advance(10);
    registry
        .add_or_update_step("s1", StepUpdate::new("ai-gen", StepStatus::Running))
        .await
        .unwrap();

    registry
        .set_transparency(
            "s1",
            TransparencyUpdate {
                model: Some("gpt-4".to_string()),
                prompt_tokens: Some(850),
                completion_tokens: Some(120),
                total_tokens: Some(970),
                estimated_cost: Some(0.0194),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    clock.advance(800);
    registry
        .add_or_update_step(
            "s1",
            StepUpdate::new("ai-gen", StepStatus::Completed).with_confidence(0.95),
        )
        .await
        .unwrap();

    clock.advance(100);
    registry
        .complete_session(
            "s1",
            CompleteSession::new(SessionStatus::Completed)
                .with_artifact("SELECT * FROM players ORDER BY score DESC LIMIT 10"),
        )
        .await
        .unwrap();

    let snapshot = registry.get_session("s1").await.unwrap().unwrap();
    assert_eq!(snapshot.session.status, SessionStatus::Completed);
    assert_eq!(snapshot.session.overall_confidence, Some(0.95));
    assert_eq!(snapshot.step_counts.completed, 2);
    assert_eq!(snapshot.step_counts.total(), 2);

    let transparency = snapshot.transparency.unwrap();
    assert_eq!(transparency.api_call_count, 1);
    assert_eq!(transparency.total_tokens, 970);

    // Step durations derive from the injected clock
    let ai_gen = snapshot
        .steps
        .iter()
        .find(|s| s.step_id == "ai-gen")
        .unwrap();
    assert_eq!(ai_gen.duration_ms, Some(800));
}

#[tokio::test]
async fn test_lifecycle_invariant() {
    let (registry, clock) = test_registry();

    registry
        .start_session(StartSession::new("s1", "u1", "q", "sql_generation"))
        .await
        .unwrap();
    clock.advance(777);
    let session = registry
        .complete_session("s1", CompleteSession::new(SessionStatus::Error).with_error("boom"))
        .await
        .unwrap();

    let end = session.end_time.unwrap();
    assert!(end >= session.start_time);
    assert_eq!(session.total_duration_ms, Some(end - session.start_time));
    assert_eq!(session.error_message.as_deref(), Some("boom"));
}

#[tokio::test]
async fn test_idempotent_step_upsert() {
    let (registry, clock) = test_registry();

    registry
        .start_session(StartSession::new("s1", "u1", "q", "sql_generation"))
        .await
        .unwrap();
    registry
        .add_or_update_step("s1", StepUpdate::new("auth", StepStatus::Running))
        .await
        .unwrap();
    clock.advance(40);
    let first = registry
        .add_or_update_step("s1", StepUpdate::new("auth", StepStatus::Completed))
        .await
        .unwrap();

    clock.advance(1_000);
    let second = registry
        .add_or_update_step("s1", StepUpdate::new("auth", StepStatus::Completed))
        .await
        .unwrap();

    assert_eq!(second.duration_ms, first.duration_ms);
    assert_eq!(second.end_time, first.end_time);

    let snapshot = registry.get_session("s1").await.unwrap().unwrap();
    assert_eq!(snapshot.steps.len(), 1);
}

#[tokio::test]
async fn test_hierarchy_validation_creates_nothing() {
    let (registry, _clock) = test_registry();

    registry
        .start_session(StartSession::new("s1", "u1", "q", "sql_generation"))
        .await
        .unwrap();

    let err = registry
        .add_or_update_step(
            "s1",
            StepUpdate::new("child", StepStatus::Pending).with_parent("missing"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Validation(_)));

    let snapshot = registry.get_session("s1").await.unwrap().unwrap();
    assert!(snapshot.steps.is_empty());
}

#[tokio::test]
async fn test_cascade_skip_through_registry() {
    let (registry, _clock) = test_registry();

    registry
        .start_session(StartSession::new("s1", "u1", "q", "sql_generation"))
        .await
        .unwrap();
    registry
        .add_or_update_step("s1", StepUpdate::new("a", StepStatus::Running))
        .await
        .unwrap();
    registry
        .add_or_update_step(
            "s1",
            StepUpdate::new("b", StepStatus::Pending).with_parent("a"),
        )
        .await
        .unwrap();

    // No direct call ever references "b" again
    registry
        .add_or_update_step("s1", StepUpdate::new("a", StepStatus::Error))
        .await
        .unwrap();

    let snapshot = registry.get_session("s1").await.unwrap().unwrap();
    let b = snapshot.steps.iter().find(|s| s.step_id == "b").unwrap();
    assert_eq!(b.status, StepStatus::Skipped);
    assert_eq!(snapshot.step_counts.skipped, 1);
    assert_eq!(snapshot.step_counts.error, 1);
}

#[tokio::test]
async fn test_transparency_accumulates_across_calls() {
    let (registry, _clock) = test_registry();

    registry
        .start_session(StartSession::new("s1", "u1", "q", "sql_generation"))
        .await
        .unwrap();
    registry
        .set_transparency(
            "s1",
            TransparencyUpdate {
                total_tokens: Some(100),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let record = registry
        .set_transparency(
            "s1",
            TransparencyUpdate {
                total_tokens: Some(50),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(record.total_tokens, 150);
    assert_eq!(record.api_call_count, 2);
}

#[tokio::test]
async fn test_log_counts_in_snapshot() {
    let (registry, _clock) = test_registry();

    registry
        .start_session(StartSession::new("s1", "u1", "q", "sql_generation"))
        .await
        .unwrap();
    registry
        .log("s1", LogRequest::new(LogLevel::Info, "analyzing query"))
        .await
        .unwrap();
    registry
        .log(
            "s1",
            LogRequest::new(LogLevel::Error, "schema lookup failed").for_step("schema"),
        )
        .await
        .unwrap();

    let snapshot = registry.get_session("s1").await.unwrap().unwrap();
    assert_eq!(snapshot.log_count, 2);
    assert_eq!(snapshot.error_log_count, 1);
}

#[tokio::test]
async fn test_events_published_in_mutation_order() {
    let recorder = RecordingNotifier::new();
    let notifier = NotifierHandle::spawn(vec![recorder.clone() as Arc<dyn NotifierPort>], 64);
    let registry = SessionRegistry::new(Arc::new(MemoryStore::new()), notifier);

    registry
        .start_session(StartSession::new("s1", "u1", "q", "sql_generation"))
        .await
        .unwrap();
    registry
        .add_or_update_step("s1", StepUpdate::new("auth", StepStatus::Completed))
        .await
        .unwrap();
    registry
        .complete_session("s1", CompleteSession::new(SessionStatus::Completed))
        .await
        .unwrap();

    // Delivery is async; give the dispatcher a moment to drain
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(
        recorder.seen(),
        vec!["session_started", "step_changed", "session_completed"]
    );
}

#[tokio::test]
async fn test_build_registry_from_config() {
    let mut config = flow_trace::config::FlowTraceConfig::default();
    config.store.database_url = "sqlite::memory:".to_string();
    config.cleanup.enabled = false;

    let registry = flow_trace::build_registry(&config, Vec::new()).await.unwrap();

    registry
        .start_session(StartSession::new("s1", "u1", "q", "sql_generation"))
        .await
        .unwrap();
    assert!(registry.get_session("s1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_sqlite_flow_and_cold_read() {
    let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());

    let registry = SessionRegistry::new(store.clone(), NotifierHandle::disabled());
    let mut request = StartSession::new("s1", "u1", "find top 10 players", "sql_generation")
        .with_conversation("c1");
    request
        .metadata
        .insert("channel".to_string(), MetaValue::from("dashboard"));
    registry.start_session(request).await.unwrap();

    registry
        .add_or_update_step("s1", StepUpdate::new("auth", StepStatus::Completed))
        .await
        .unwrap();
    registry
        .log("s1", LogRequest::new(LogLevel::Info, "authenticated"))
        .await
        .unwrap();
    registry
        .set_transparency(
            "s1",
            TransparencyUpdate {
                model: Some("gpt-4".to_string()),
                total_tokens: Some(970),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    registry
        .complete_session("s1", CompleteSession::new(SessionStatus::Completed))
        .await
        .unwrap();

    // A second registry sharing the store has no in-memory state for "s1",
    // so this exercises the cold-read path
    let cold = SessionRegistry::new(store.clone(), NotifierHandle::disabled());
    let snapshot = cold.get_session("s1").await.unwrap().unwrap();

    assert_eq!(snapshot.session.status, SessionStatus::Completed);
    assert_eq!(snapshot.session.conversation_id.as_deref(), Some("c1"));
    assert_eq!(
        snapshot.session.metadata.get("channel"),
        Some(&MetaValue::from("dashboard"))
    );
    assert_eq!(snapshot.steps.len(), 1);
    assert_eq!(snapshot.log_count, 1);
    assert_eq!(snapshot.transparency.unwrap().total_tokens, 970);
}
