//! Concurrent claim/execute/heartbeat worker pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use waypoint_core::{defaults, EventBus, EventRepository, Job, JobRepository, JobStatus, JobType, Result};

use crate::handler::{JobContext, JobHandler, JobResult};

/// Tunables for the worker pool, defaulting to `waypoint_core::defaults`
/// and overridable from the environment.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    pub parallelism: usize,
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            parallelism: defaults::PARALLELISM,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `PARALLELISM` | `4` | Concurrent claim/execute loops |
    /// | `JOB_POLL_INTERVAL_MS` | `750` | Sleep when the queue is empty |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let parallelism = std::env::var("PARALLELISM")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::PARALLELISM)
            .max(1);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::POLL_INTERVAL_MS);

        Self {
            poll_interval_ms,
            parallelism,
            enabled,
        }
    }
}

/// In-process observability events for the worker pool, independent of
/// the durable job-event journal.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    JobStarted { job_id: Uuid, job_type: JobType },
    JobCompleted { job_id: Uuid, job_type: JobType },
    JobFailed { job_id: Uuid, job_type: JobType, error: String },
    JobCanceled { job_id: Uuid, job_type: JobType },
    WorkerStarted,
    WorkerStopped,
}

/// Handle for controlling and observing a started worker pool.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| waypoint_core::Error::Internal("failed to send shutdown signal".into()))?;
        Ok(())
    }

    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Registry of cancellation tokens for in-flight jobs, so `cancel_job`
/// (driven by an RPC request) can reach a job being executed by a
/// worker task in a different tokio task.
pub type CancellationRegistry = Arc<RwLock<HashMap<Uuid, CancellationToken>>>;

/// Concurrent claim/execute worker pool.
pub struct JobWorker {
    jobs: Arc<dyn JobRepository>,
    events: Arc<dyn EventRepository>,
    bus: Arc<EventBus>,
    config: WorkerConfig,
    handlers: Arc<RwLock<HashMap<JobType, Arc<dyn JobHandler>>>>,
    event_tx: broadcast::Sender<WorkerEvent>,
    cancellations: CancellationRegistry,
}

impl JobWorker {
    pub fn new(jobs: Arc<dyn JobRepository>, events: Arc<dyn EventRepository>, bus: Arc<EventBus>, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            jobs,
            events,
            bus,
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            cancellations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register_handler<H: JobHandler + 'static>(&self, handler: H) {
        let job_type = handler.job_type();
        self.handlers.write().await.insert(job_type, Arc::new(handler));
        debug!(?job_type, "registered job handler");
    }

    /// Shared registry a transport-layer `cancel_job` call uses to signal
    /// an in-flight job's cancellation token.
    pub fn cancellations(&self) -> CancellationRegistry {
        self.cancellations.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker pool and return a handle for control/observation.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let worker = Arc::new(self);
        tokio::spawn(async move {
            worker.run(&mut shutdown_rx).await;
        });

        WorkerHandle { shutdown_tx, event_rx }
    }

    #[instrument(skip(self, shutdown_rx))]
    async fn run(self: Arc<Self>, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("job worker disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            parallelism = self.config.parallelism,
            "job worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            let mut claimed = 0;
            let mut tasks = tokio::task::JoinSet::new();

            for _ in 0..self.config.parallelism {
                match self.jobs.claim_next().await {
                    Ok(Some(job)) => {
                        claimed += 1;
                        let worker = self.clone();
                        tasks.spawn(async move {
                            worker.execute_job(job).await;
                        });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = ?e, "failed to claim job");
                        break;
                    }
                }
            }

            if claimed == 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = sleep(poll_interval) => {}
                }
            } else {
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "job task panicked");
                    }
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("job worker stopped");
    }

    async fn heartbeat_loop(jobs: Arc<dyn JobRepository>, job_id: Uuid, stop: CancellationToken) {
        let interval = Duration::from_secs(defaults::HEARTBEAT_INTERVAL_SECS);
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = sleep(interval) => {
                    if let Err(e) = jobs.heartbeat(job_id).await {
                        warn!(?job_id, error = ?e, "heartbeat failed");
                    }
                }
            }
        }
    }

    async fn execute_job(self: Arc<Self>, job: Job) {
        let start = Instant::now();
        let job_id = job.id;
        let job_type = job.job_type;

        info!(?job_id, ?job_type, "processing job");
        let _ = self.event_tx.send(WorkerEvent::JobStarted { job_id, job_type });

        let cancellation = CancellationToken::new();
        self.cancellations.write().await.insert(job_id, cancellation.clone());

        let heartbeat_stop = CancellationToken::new();
        let heartbeat_handle = tokio::spawn(Self::heartbeat_loop(
            self.jobs.clone(),
            job_id,
            heartbeat_stop.clone(),
        ));

        let handler = { self.handlers.read().await.get(&job_type).cloned() };

        let result = match handler {
            Some(handler) => {
                let ctx = JobContext::new(job, cancellation, self.events.clone(), self.bus.clone());
                let job_timeout = Duration::from_secs(defaults::JOB_TOTAL_TIMEOUT_SECS);
                match tokio::time::timeout(job_timeout, handler.execute(ctx)).await {
                    Ok(result) => result,
                    Err(_) => JobResult::Failed(format!(
                        "job exceeded total timeout of {}s",
                        defaults::JOB_TOTAL_TIMEOUT_SECS
                    )),
                }
            }
            None => JobResult::Failed(format!("no handler registered for job type: {job_type:?}")),
        };

        heartbeat_stop.cancel();
        let _ = heartbeat_handle.await;
        self.cancellations.write().await.remove(&job_id);

        let outcome = match result {
            JobResult::Success(value) => {
                (JobStatus::Succeeded, Some(value), None, WorkerEvent::JobCompleted { job_id, job_type })
            }
            JobResult::Failed(error) => (
                JobStatus::Failed,
                None,
                Some(error.clone()),
                WorkerEvent::JobFailed { job_id, job_type, error },
            ),
            JobResult::Canceled => {
                (JobStatus::Canceled, None, None, WorkerEvent::JobCanceled { job_id, job_type })
            }
        };

        let (status, result_value, error, event) = outcome;
        if let Err(e) = self.jobs.finish(job_id, status, result_value, error).await {
            error!(error = ?e, ?job_id, "failed to record job outcome");
        } else {
            info!(
                ?job_id,
                ?job_type,
                ?status,
                duration_ms = start.elapsed().as_millis() as u64,
                "job finished"
            );
            let _ = self.event_tx.send(event);
        }
    }
}
