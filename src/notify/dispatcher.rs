//! Bounded drop-oldest event dispatcher
//!
//! `publish` never blocks and never fails: on overflow the oldest pending
//! event is evicted (counted and warn-logged). A background task drains the
//! queue and delivers each event to every sink; sink failures are logged and
//! swallowed. The task exits once every handle is dropped and the queue is
//! drained.

use crate::metrics;
use crate::ports::{FlowEvent, NotifierPort};
use futures::FutureExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// How long the drain task sleeps between wake-up checks when idle
const IDLE_POLL: Duration = Duration::from_millis(100);

struct Queue {
    events: Mutex<VecDeque<FlowEvent>>,
    wakeup: tokio::sync::Notify,
    capacity: usize,
}

/// Cloneable publishing handle for the dispatcher
#[derive(Clone)]
pub struct NotifierHandle {
    queue: Arc<Queue>,
}

impl NotifierHandle {
    /// Spawn the drain task and return the publishing handle
    ///
    /// # Arguments
    ///
    /// * `sinks` - notifier implementations to fan each event out to
    /// * `capacity` - max pending events before drop-oldest kicks in
    pub fn spawn(sinks: Vec<Arc<dyn NotifierPort>>, capacity: usize) -> Self {
        let queue = Arc::new(Queue {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            wakeup: tokio::sync::Notify::new(),
            capacity: capacity.max(1),
        });

        let weak = Arc::downgrade(&queue);
        tokio::spawn(async move {
            let result = std::panic::AssertUnwindSafe(drain_task(weak, sinks))
                .catch_unwind()
                .await;
            if let Err(e) = result {
                tracing::error!(panic = ?e, "Notification dispatcher panicked");
            }
        });

        Self { queue }
    }

    /// Handle with no sinks, for embedders that do not need live delivery
    pub fn disabled() -> Self {
        Self::spawn(Vec::new(), 1)
    }

    /// Enqueue an event without blocking
    ///
    /// Delivery is best-effort: on a full queue the oldest pending event is
    /// dropped to make room.
    pub fn publish(&self, event: FlowEvent) {
        {
            let mut events = self.queue.events.lock().expect("notifier queue poisoned");
            if events.len() >= self.queue.capacity {
                if let Some(dropped) = events.pop_front() {
                    metrics::record_notification_dropped(dropped.kind());
                    tracing::warn!(
                        event = dropped.kind(),
                        session_id = %dropped.session_id(),
                        "Notification queue full, dropping oldest event"
                    );
                }
            }
            events.push_back(event);
        }
        self.queue.wakeup.notify_one();
    }

    /// Number of events waiting for delivery (for monitoring)
    pub fn pending_count(&self) -> usize {
        self.queue.events.lock().expect("notifier queue poisoned").len()
    }
}

async fn drain_task(weak: Weak<Queue>, sinks: Vec<Arc<dyn NotifierPort>>) {
    loop {
        let Some(queue) = weak.upgrade() else {
            break;
        };

        let next = queue
            .events
            .lock()
            .expect("notifier queue poisoned")
            .pop_front();

        match next {
            Some(event) => {
                for sink in &sinks {
                    if let Err(e) = sink.notify(&event).await {
                        // Dispatch failures must never reach the pipeline
                        tracing::warn!(
                            event = event.kind(),
                            session_id = %event.session_id(),
                            error = %e,
                            "Notifier delivery failed"
                        );
                    } else {
                        metrics::record_notification_delivered(event.kind());
                    }
                }
            }
            None => {
                // Wait for a publish, with a periodic wake-up so the task can
                // notice that all handles are gone
                tokio::select! {
                    _ = queue.wakeup.notified() => {}
                    _ = tokio::time::sleep(IDLE_POLL) => {}
                }
            }
        }
    }

    tracing::debug!("Notification dispatcher shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FlowSession, SessionStatus};
    use async_trait::async_trait;

    fn session(id: &str) -> FlowSession {
        FlowSession {
            session_id: id.to_string(),
            user_id: "u1".to_string(),
            query: "q".to_string(),
            query_type: "sql".to_string(),
            status: SessionStatus::Running,
            start_time: 1_000,
            end_time: None,
            total_duration_ms: None,
            overall_confidence: None,
            generated_artifact: None,
            execution_result: None,
            error_message: None,
            conversation_id: None,
            message_id: None,
            metadata: Default::default(),
        }
    }

    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotifierPort for Recording {
        async fn notify(&self, event: &FlowEvent) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(event.session_id().to_string());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl NotifierPort for Failing {
        async fn notify(&self, _event: &FlowEvent) -> anyhow::Result<()> {
            anyhow::bail!("transport down")
        }
    }

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let recording = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
        });
        let handle = NotifierHandle::spawn(vec![recording.clone() as Arc<dyn NotifierPort>], 16);

        for id in ["s1", "s2", "s3"] {
            handle.publish(FlowEvent::SessionStarted {
                session: session(id),
            });
        }

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(*recording.seen.lock().unwrap(), vec!["s1", "s2", "s3"]);
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        // No sinks, so nothing drains the queue faster than we fill it; use a
        // capacity of 2 and verify eviction order by draining manually
        let handle = NotifierHandle {
            queue: Arc::new(Queue {
                events: Mutex::new(VecDeque::new()),
                wakeup: tokio::sync::Notify::new(),
                capacity: 2,
            }),
        };

        for id in ["s1", "s2", "s3"] {
            handle.publish(FlowEvent::SessionStarted {
                session: session(id),
            });
        }

        let events = handle.queue.events.lock().unwrap();
        let ids: Vec<&str> = events.iter().map(|e| e.session_id()).collect();
        assert_eq!(ids, vec!["s2", "s3"]);
    }

    #[tokio::test]
    async fn test_sink_failure_swallowed() {
        let handle = NotifierHandle::spawn(vec![Arc::new(Failing)], 16);

        handle.publish(FlowEvent::SessionStarted {
            session: session("s1"),
        });

        tokio::time::sleep(Duration::from_millis(200)).await;

        // Queue drained despite the failing sink
        assert_eq!(handle.pending_count(), 0);
    }
}
