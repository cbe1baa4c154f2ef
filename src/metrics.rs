use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Register metric descriptions (can be called multiple times safely)
///
/// The crate only emits through the `metrics` facade; installing a recorder
/// (Prometheus or otherwise) is the embedding application's choice.
pub fn describe_metrics() {
    describe_counter!(
        "flow_trace_sessions_started_total",
        "Total number of tracing sessions started"
    );
    describe_counter!(
        "flow_trace_sessions_completed_total",
        "Total number of tracing sessions reaching a terminal status"
    );
    describe_counter!(
        "flow_trace_steps_upserted_total",
        "Total number of step upserts applied"
    );
    describe_histogram!(
        "flow_trace_store_write_seconds",
        "Store write duration in seconds"
    );
    describe_histogram!(
        "flow_trace_session_duration_seconds",
        "Total session duration in seconds"
    );
    describe_counter!(
        "flow_trace_notifications_delivered_total",
        "Change events delivered to notifier sinks"
    );
    describe_counter!(
        "flow_trace_notifications_dropped_total",
        "Change events evicted from a full dispatch queue"
    );
}

/// Record a session start
pub fn record_session_started(query_type: &str) {
    counter!(
        "flow_trace_sessions_started_total",
        "query_type" => query_type.to_string(),
    )
    .increment(1);
}

/// Record a session reaching a terminal status
pub fn record_session_completed(status: &str, duration_ms: u64) {
    counter!(
        "flow_trace_sessions_completed_total",
        "status" => status.to_string(),
    )
    .increment(1);

    histogram!(
        "flow_trace_session_duration_seconds",
        "status" => status.to_string(),
    )
    .record(duration_ms as f64 / 1_000.0);
}

/// Record a step upsert
pub fn record_step_upserted(status: &str) {
    counter!(
        "flow_trace_steps_upserted_total",
        "status" => status.to_string(),
    )
    .increment(1);
}

/// Record a store write
pub fn record_store_write(operation: &str, duration: Duration) {
    histogram!(
        "flow_trace_store_write_seconds",
        "operation" => operation.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a delivered change event
pub fn record_notification_delivered(event: &str) {
    counter!(
        "flow_trace_notifications_delivered_total",
        "event" => event.to_string(),
    )
    .increment(1);
}

/// Record an event evicted from a full dispatch queue
pub fn record_notification_dropped(event: &str) {
    counter!(
        "flow_trace_notifications_dropped_total",
        "event" => event.to_string(),
    )
    .increment(1);
}
