//! Resumable event-stream replay: cursor-based resumption with no
//! duplicate emissions and no gaps.
//!
//! Shared by the SSE job-events endpoint and WebSocket subscriptions: a
//! reconnecting client supplies the last event id it saw, the journal is
//! drained from there, and the process-local `EventBus` takes over for
//! anything that happens afterward.

use futures::stream::{self, BoxStream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use waypoint_core::{EventRepository, EventBus, JobEvent, Result, ServerEvent};

/// Replay every journaled event for `job_id` after `since_event_id`, then
/// switch to live events from `bus` filtered to the same job, discarding
/// any live event whose id was already delivered during replay.
pub async fn replay_and_subscribe(
    events: &dyn EventRepository,
    bus: &EventBus,
    job_id: Uuid,
    since_event_id: i64,
) -> Result<BoxStream<'static, Result<JobEvent>>> {
    let backlog = events.events_since(job_id, since_event_id).await?;
    let last_replayed_id = backlog.last().map(|e| e.id).unwrap_or(since_event_id);

    let replay = stream::iter(backlog.into_iter().map(Ok));

    let live = BroadcastStream::new(bus.subscribe()).filter_map(move |item| {
        let job_id = job_id;
        async move {
            match item {
                Ok(ServerEvent::Job(msg)) if msg.job_id == job_id && msg.event_id > last_replayed_id => {
                    Some(Ok(JobEvent {
                        id: msg.event_id,
                        job_id: msg.job_id,
                        event_type: msg.event_type,
                        payload: msg.payload,
                        created_at: chrono::Utc::now(),
                    }))
                }
                Ok(_) => None,
                Err(_lagged) => None,
            }
        }
    });

    Ok(replay.chain(live).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use waypoint_core::EventType;

    #[derive(Default)]
    struct FakeEvents {
        rows: Mutex<Vec<JobEvent>>,
    }

    #[async_trait]
    impl EventRepository for FakeEvents {
        async fn append_event(
            &self,
            job_id: Uuid,
            event_type: EventType,
            payload: serde_json::Value,
        ) -> Result<i64> {
            let mut rows = self.rows.lock().unwrap();
            let id = rows.len() as i64 + 1;
            rows.push(JobEvent {
                id,
                job_id,
                event_type,
                payload,
                created_at: chrono::Utc::now(),
            });
            Ok(id)
        }

        async fn events_since(&self, job_id: Uuid, since_id: i64) -> Result<Vec<JobEvent>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.job_id == job_id && e.id > since_id)
                .cloned()
                .collect())
        }

        async fn delete_events_older_than(&self, _older_than: chrono::Duration) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn replays_backlog_before_switching_to_live() {
        let events = FakeEvents::default();
        let job_id = Uuid::new_v4();
        events.append_event(job_id, EventType::Submitted, serde_json::json!({})).await.unwrap();
        events.append_event(job_id, EventType::Started, serde_json::json!({})).await.unwrap();

        let bus = EventBus::new(16);
        let mut stream = replay_and_subscribe(&events, &bus, job_id, 0).await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.event_type, EventType::Submitted);
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.event_type, EventType::Started);
    }

    #[tokio::test]
    async fn since_id_skips_already_seen_backlog() {
        let events = FakeEvents::default();
        let job_id = Uuid::new_v4();
        events.append_event(job_id, EventType::Submitted, serde_json::json!({})).await.unwrap();
        let second_id = events.append_event(job_id, EventType::Started, serde_json::json!({})).await.unwrap();

        let bus = EventBus::new(16);
        let mut stream = replay_and_subscribe(&events, &bus, job_id, 1).await.unwrap();

        let only = stream.next().await.unwrap().unwrap();
        assert_eq!(only.id, second_id);
    }
}
