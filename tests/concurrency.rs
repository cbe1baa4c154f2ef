/// Concurrency guarantees: full parallelism across sessions, serialized
/// mutation within one
use flow_trace::error::FlowError;
use flow_trace::model::{SessionStatus, StepStatus};
use flow_trace::notify::NotifierHandle;
use flow_trace::registry::{CompleteSession, SessionRegistry, StartSession};
use flow_trace::store::MemoryStore;
use flow_trace::tracker::StepUpdate;
use futures::future::join_all;
use std::sync::Arc;

fn test_registry() -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new(
        Arc::new(MemoryStore::new()),
        NotifierHandle::disabled(),
    ))
}

#[tokio::test]
async fn test_concurrent_distinct_steps_all_applied() {
    let registry = test_registry();
    registry
        .start_session(StartSession::new("s1", "u1", "q", "sql_generation"))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .add_or_update_step(
                        "s1",
                        StepUpdate::new(format!("step-{i}"), StepStatus::Completed),
                    )
                    .await
            })
        })
        .collect();

    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let snapshot = registry.get_session("s1").await.unwrap().unwrap();
    assert_eq!(snapshot.step_counts.total(), 32);
    assert_eq!(snapshot.step_counts.completed, 32);
}

#[tokio::test]
async fn test_sessions_progress_independently() {
    let registry = test_registry();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move {
                let session_id = format!("s{i}");
                registry
                    .start_session(StartSession::new(&session_id, "u1", "q", "sql_generation"))
                    .await?;
                registry
                    .add_or_update_step(&session_id, StepUpdate::new("auth", StepStatus::Completed))
                    .await?;
                registry
                    .complete_session(&session_id, CompleteSession::new(SessionStatus::Completed))
                    .await
            })
        })
        .collect();

    for result in join_all(tasks).await {
        let session = result.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
    }

    assert_eq!(registry.resident_sessions(), 16);
}

#[tokio::test]
async fn test_same_step_conflicting_terminals_arbitrated_by_state_machine() {
    let registry = test_registry();
    registry
        .start_session(StartSession::new("s1", "u1", "q", "sql_generation"))
        .await
        .unwrap();
    registry
        .add_or_update_step("s1", StepUpdate::new("gen", StepStatus::Running))
        .await
        .unwrap();

    // Two racing terminal reports for the same step: whichever arrives at the
    // session lock first wins, the other must fail the transition check
    let a = {
        let registry = registry.clone();
        tokio::spawn(async move {
            registry
                .add_or_update_step("s1", StepUpdate::new("gen", StepStatus::Completed))
                .await
        })
    };
    let b = {
        let registry = registry.clone();
        tokio::spawn(async move {
            registry
                .add_or_update_step("s1", StepUpdate::new("gen", StepStatus::Cancelled))
                .await
        })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let ok_count = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok_count, 1);

    let loser = results.iter().find(|r| r.is_err()).unwrap();
    assert!(matches!(
        loser.as_ref().unwrap_err(),
        FlowError::InvalidStepTransition { .. }
    ));

    // The surviving status is one of the two requested terminals
    let snapshot = registry.get_session("s1").await.unwrap().unwrap();
    let status = snapshot.steps[0].status;
    assert!(status == StepStatus::Completed || status == StepStatus::Cancelled);
}

#[tokio::test]
async fn test_concurrent_transparency_updates_all_counted() {
    let registry = test_registry();
    registry
        .start_session(StartSession::new("s1", "u1", "q", "sql_generation"))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .set_transparency(
                        "s1",
                        flow_trace::model::TransparencyUpdate {
                            total_tokens: Some(10),
                            ..Default::default()
                        },
                    )
                    .await
            })
        })
        .collect();

    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let snapshot = registry.get_session("s1").await.unwrap().unwrap();
    let record = snapshot.transparency.unwrap();
    assert_eq!(record.total_tokens, 100);
    assert_eq!(record.api_call_count, 10);
}

#[tokio::test]
async fn test_duplicate_start_race_single_winner() {
    let registry = test_registry();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .start_session(StartSession::new("s1", "u1", "q", "sql_generation"))
                    .await
            })
        })
        .collect();

    let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();
    let ok_count = results.iter().filter(|r| r.is_ok()).count();

    assert_eq!(ok_count, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(
            result.as_ref().unwrap_err(),
            FlowError::DuplicateSession(_)
        ));
    }
}
