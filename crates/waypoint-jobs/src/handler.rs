//! The `JobHandler` trait boundary: what a worker needs from a concrete
//! job implementation, and what it hands back in return.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use waypoint_core::{EventBus, EventRepository, EventType, Job, JobEventMessage, Result, ServerEvent};

/// Outcome of running a job to completion.
#[derive(Debug)]
pub enum JobResult {
    Success(serde_json::Value),
    Failed(String),
    Canceled,
}

/// Everything a handler's `execute` needs: the claimed job, a way to
/// observe cancellation at each suspension point, and a way to append
/// journal events. `emit` appends to the durable journal and fans the
/// same event out live over the process-local `EventBus`, so a client
/// attached via `resume::replay_and_subscribe` sees it both ways: in
/// the backlog if it reconnects later, live if it's already watching.
#[derive(Clone)]
pub struct JobContext {
    pub job: Job,
    pub cancellation: CancellationToken,
    events: Arc<dyn EventRepository>,
    bus: Arc<EventBus>,
}

impl JobContext {
    pub fn new(job: Job, cancellation: CancellationToken, events: Arc<dyn EventRepository>, bus: Arc<EventBus>) -> Self {
        Self {
            job,
            cancellation,
            events,
            bus,
        }
    }

    pub async fn emit(&self, event_type: EventType, payload: serde_json::Value) -> Result<i64> {
        let event_id = self.events.append_event(self.job.id, event_type, payload.clone()).await?;
        self.bus.emit(ServerEvent::Job(JobEventMessage {
            job_id: self.job.id,
            event_id,
            event_type: event_type.to_string(),
            payload,
        }));
        Ok(event_id)
    }

    pub fn job_id(&self) -> Uuid {
        self.job.id
    }

    pub fn is_canceled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Trait every job implementation satisfies. Only one job type exists
/// today (`research`), but the trait boundary exists so a future job
/// kind — a reindex sweep, say — plugs into the same worker pool.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> waypoint_core::JobType;
    async fn execute(&self, ctx: JobContext) -> JobResult;
}
