//! Process-local event bus for live fan-out to WebSocket/SSE subscribers.
//!
//! This is a cache, not a source of truth: the durable record of every job
//! event is the `job_events` table (see `waypoint-db`), which supports
//! cursor-based replay for reconnecting clients. `EventBus` exists so a
//! live subscriber doesn't have to poll the database for every new event —
//! the worker that appends an event to the journal also publishes it here,
//! and subscribers that are already attached get it immediately.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::EventType;

/// An event fanned out over the bus, shaped identically to a `job_events` row
/// so a live subscriber and a cursor-replay client see the same payload.
#[derive(Debug, Clone, Serialize)]
pub struct JobEventMessage {
    pub job_id: Uuid,
    pub event_id: i64,
    pub event_type: EventType,
    pub payload: serde_json::Value,
}

/// Unified server event type broadcast to WebSocket/SSE/in-process subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// A job journal entry, republished as soon as it is durably appended.
    Job(JobEventMessage),
    /// Periodic queue statistics, used by the `/metrics`-style surface and
    /// any subscriber that wants a coarse heartbeat without per-job detail.
    QueueStatus {
        queued: i64,
        running: i64,
        succeeded: i64,
        failed: i64,
    },
}

impl ServerEvent {
    /// Returns the event type name (used for the SSE `event:` field).
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::Job(msg) => msg.event_type.as_str(),
            ServerEvent::QueueStatus { .. } => "QueueStatus",
        }
    }

    /// The job this event belongs to, if any (`QueueStatus` has none).
    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            ServerEvent::Job(msg) => Some(msg.job_id),
            ServerEvent::QueueStatus { .. } => None,
        }
    }
}

/// Broadcast-based event bus for distributing server events to multiple consumers.
///
/// Uses `tokio::sync::broadcast` with a configurable buffer size. Slow receivers
/// that fall behind will receive a `Lagged` error and miss events — acceptable
/// here because every subscriber can recover by resuming from `job_events` with
/// its last-seen cursor.
pub struct EventBus {
    tx: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers.
    ///
    /// If there are no active subscribers, the event is silently dropped —
    /// the journal row already persisted, so nothing is lost.
    pub fn emit(&self, event: ServerEvent) {
        let event_type = event.event_type();
        let subscriber_count = self.tx.receiver_count();
        tracing::debug!(event_type, subscriber_count, "EventBus emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to receive events. Each subscriber gets its own independent stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job_event(event_type: EventType) -> JobEventMessage {
        JobEventMessage {
            job_id: Uuid::nil(),
            event_id: 1,
            event_type,
            payload: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_event_bus_emit_subscribe() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();

        bus.emit(ServerEvent::QueueStatus {
            queued: 5,
            running: 1,
            succeeded: 10,
            failed: 0,
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            ServerEvent::QueueStatus { queued: 5, .. }
        ));
    }

    #[tokio::test]
    async fn test_event_bus_multiple_subscribers() {
        let bus = EventBus::new(32);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(ServerEvent::Job(sample_job_event(EventType::Started)));

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert!(matches!(e1, ServerEvent::Job(_)));
        assert!(matches!(e2, ServerEvent::Job(_)));
    }

    #[tokio::test]
    async fn test_event_bus_no_subscribers_ok() {
        let bus = EventBus::new(32);
        bus.emit(ServerEvent::QueueStatus {
            queued: 0,
            running: 0,
            succeeded: 0,
            failed: 0,
        });
    }

    #[tokio::test]
    async fn test_event_bus_subscriber_count() {
        let bus = EventBus::new(32);
        assert_eq!(bus.subscriber_count(), 0);

        let rx1 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(rx1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_job_event_json_serialization() {
        let event = ServerEvent::Job(sample_job_event(EventType::AgentCompleted));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"Job"#));
        assert!(json.contains(r#""event_type":"agent_completed"#));
    }

    #[test]
    fn test_queue_status_json_serialization() {
        let event = ServerEvent::QueueStatus {
            queued: 1,
            running: 2,
            succeeded: 3,
            failed: 4,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"QueueStatus"#));
        assert!(json.contains(r#""failed":4"#));
    }

    #[test]
    fn test_job_id_accessor() {
        let id = Uuid::new_v4();
        let mut msg = sample_job_event(EventType::Completed);
        msg.job_id = id;
        let event = ServerEvent::Job(msg);
        assert_eq!(event.job_id(), Some(id));

        let status = ServerEvent::QueueStatus {
            queued: 0,
            running: 0,
            succeeded: 0,
            failed: 0,
        };
        assert_eq!(status.job_id(), None);
    }

    #[tokio::test]
    async fn test_event_bus_lagged_receiver() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for _ in 0..5 {
            bus.emit(ServerEvent::Job(sample_job_event(EventType::Progress)));
        }

        let result = rx.recv().await;
        assert!(result.is_ok() || matches!(result, Err(broadcast::error::RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_type_names_exhaustive() {
        let all = [
            EventType::Submitted,
            EventType::Started,
            EventType::Progress,
            EventType::AgentStarted,
            EventType::AgentCompleted,
            EventType::AgentUsage,
            EventType::SynthesisToken,
            EventType::SynthesisError,
            EventType::ReportSaved,
            EventType::UiHint,
            EventType::Abandoned,
            EventType::Error,
            EventType::Completed,
            EventType::Canceled,
        ];
        for variant in all {
            assert!(!variant.as_str().is_empty());
        }
    }
}
