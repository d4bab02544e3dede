//! Idempotent job submission: derive a key from the request parameters,
//! fold concurrent equivalent submissions onto one job, and let callers
//! opt out with `force_new`.
//!
//! Implements the full branch table from spec.md §4.3 "Idempotency": a
//! submission under an existing key is answered differently depending on
//! whether the prior job is still in flight, already succeeded, or
//! terminated in failure/cancellation.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use waypoint_core::{defaults, EventRepository, EventType, JobRepository, JobStatus, JobType, Result};

use crate::idempotency::{canonicalize, derive_key};

/// Append the pair of events spec.md §4.3 requires once a job row exists:
/// `submitted` (the journal's first entry) followed by `ui_hint` carrying
/// the URLs a client can use to watch the job (SSE stream) or open it in
/// the web UI, mirroring the "SSE/UI URLs" the idempotency branches return
/// inline.
async fn emit_submission_events(events: &Arc<dyn EventRepository>, job_id: Uuid) -> Result<()> {
    events
        .append_event(job_id, EventType::Submitted, serde_json::json!({}))
        .await?;
    events
        .append_event(
            job_id,
            EventType::UiHint,
            serde_json::json!({
                "sse_url": format!("/jobs/{job_id}/events"),
                "ui_url": format!("/?job={job_id}"),
            }),
        )
        .await?;
    Ok(())
}

/// Outcome of a submission: what the caller reports back to the client.
#[derive(Debug, Clone)]
pub enum SubmissionOutcome {
    /// A brand-new job was enqueued.
    Created(Uuid),
    /// An in-flight job with the same key already exists; reuse it.
    Existing(Uuid),
    /// A prior job with the same key already succeeded; its result is
    /// returned instead of doing the work again.
    Cached { job_id: Uuid, result: Option<Value> },
    /// A prior job failed or was canceled and the retry policy allowed a
    /// fresh attempt linked to it.
    RetriedAsNew { job_id: Uuid, retry_of: Uuid },
    /// A prior job failed and the retry window/attempt budget was
    /// exhausted; surface the original failure instead of retrying.
    FailedTerminal { job_id: Uuid, error: Option<String> },
}

impl SubmissionOutcome {
    pub fn job_id(&self) -> Uuid {
        match self {
            SubmissionOutcome::Created(id)
            | SubmissionOutcome::Existing(id)
            | SubmissionOutcome::Cached { job_id: id, .. }
            | SubmissionOutcome::RetriedAsNew { job_id: id, .. }
            | SubmissionOutcome::FailedTerminal { job_id: id, .. } => *id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(
            self,
            SubmissionOutcome::Created(_) | SubmissionOutcome::RetriedAsNew { .. }
        )
    }
}

/// Submit a research job.
///
/// When `force_new` is true, the lookup is skipped entirely: a fresh job
/// is enqueued (tagged with the derived key so *later* submissions can
/// still fold onto it) regardless of any matching in-flight or recent
/// submission.
pub async fn submit(
    jobs: &Arc<dyn JobRepository>,
    events: &Arc<dyn EventRepository>,
    job_type: JobType,
    params: Value,
    force_new: bool,
) -> Result<SubmissionOutcome> {
    let canonical = canonicalize(&params);
    let key = derive_key(&canonical);

    if !force_new {
        if let Some(existing) = jobs.find_by_idempotency_key(&key).await? {
            match existing.status {
                JobStatus::Queued | JobStatus::Running => {
                    return Ok(SubmissionOutcome::Existing(existing.id));
                }
                JobStatus::Succeeded => {
                    return Ok(SubmissionOutcome::Cached {
                        job_id: existing.id,
                        result: existing.result,
                    });
                }
                JobStatus::Failed => {
                    let age = Utc::now() - existing.updated_at;
                    let within_window =
                        age.num_seconds() < defaults::IDEMPOTENCY_RETRY_WINDOW_SECS;
                    let attempts_remain =
                        existing.attempt < defaults::IDEMPOTENCY_MAX_RETRIES as i32;
                    if within_window && attempts_remain {
                        let job_id = jobs
                            .create_retry(job_type, &key, params, existing.id)
                            .await?;
                        emit_submission_events(events, job_id).await?;
                        return Ok(SubmissionOutcome::RetriedAsNew {
                            job_id,
                            retry_of: existing.id,
                        });
                    }
                    return Ok(SubmissionOutcome::FailedTerminal {
                        job_id: existing.id,
                        error: existing.error,
                    });
                }
                JobStatus::Canceled => {
                    let job_id = jobs
                        .create_retry(job_type, &key, params, existing.id)
                        .await?;
                    emit_submission_events(events, job_id).await?;
                    return Ok(SubmissionOutcome::RetriedAsNew {
                        job_id,
                        retry_of: existing.id,
                    });
                }
            }
        }
    }

    let job_id = jobs.enqueue(job_type, Some(&key), params).await?;
    emit_submission_events(events, job_id).await?;
    Ok(SubmissionOutcome::Created(job_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use waypoint_core::Job;

    struct NullEvents;

    #[async_trait]
    impl EventRepository for NullEvents {
        async fn append_event(
            &self,
            _job_id: Uuid,
            _event_type: EventType,
            _payload: Value,
        ) -> Result<i64> {
            Ok(1)
        }
        async fn events_since(&self, _job_id: Uuid, _since_id: i64) -> Result<Vec<waypoint_core::JobEvent>> {
            Ok(vec![])
        }
        async fn delete_events_older_than(&self, _older_than: chrono::Duration) -> Result<u64> {
            Ok(0)
        }
    }

    fn null_events() -> Arc<dyn EventRepository> {
        Arc::new(NullEvents)
    }

    #[derive(Default)]
    struct RecordingEvents {
        appended: Mutex<Vec<(Uuid, EventType)>>,
    }

    #[async_trait]
    impl EventRepository for RecordingEvents {
        async fn append_event(
            &self,
            job_id: Uuid,
            event_type: EventType,
            _payload: Value,
        ) -> Result<i64> {
            let mut appended = self.appended.lock().unwrap();
            appended.push((job_id, event_type));
            Ok(appended.len() as i64)
        }
        async fn events_since(&self, _job_id: Uuid, _since_id: i64) -> Result<Vec<waypoint_core::JobEvent>> {
            Ok(vec![])
        }
        async fn delete_events_older_than(&self, _older_than: chrono::Duration) -> Result<u64> {
            Ok(0)
        }
    }

    #[derive(Default)]
    struct FakeJobs {
        jobs: Mutex<std::collections::HashMap<Uuid, Job>>,
        by_key: Mutex<std::collections::HashMap<String, Uuid>>,
    }

    fn sample_job(id: Uuid) -> Job {
        Job {
            id,
            job_type: JobType::Research,
            status: JobStatus::Queued,
            params: serde_json::json!({}),
            idempotency_key: None,
            idempotency_expires_at: None,
            retry_of: None,
            result: None,
            error: None,
            attempt: 0,
            lease_expires_at: None,
            heartbeat_at: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[async_trait]
    impl JobRepository for FakeJobs {
        async fn enqueue(
            &self,
            job_type: JobType,
            idempotency_key: Option<&str>,
            params: Value,
        ) -> Result<Uuid> {
            let id = Uuid::new_v4();
            let mut job = sample_job(id);
            job.job_type = job_type;
            job.params = params;
            job.idempotency_key = idempotency_key.map(str::to_string);
            if let Some(key) = idempotency_key {
                self.by_key.lock().unwrap().insert(key.to_string(), id);
            }
            self.jobs.lock().unwrap().insert(id, job);
            Ok(id)
        }
        async fn claim_next(&self) -> Result<Option<Job>> {
            Ok(None)
        }
        async fn heartbeat(&self, _job_id: Uuid) -> Result<()> {
            Ok(())
        }
        async fn finish(
            &self,
            job_id: Uuid,
            status: JobStatus,
            result: Option<Value>,
            error: Option<String>,
        ) -> Result<()> {
            let mut jobs = self.jobs.lock().unwrap();
            if let Some(job) = jobs.get_mut(&job_id) {
                job.status = status;
                job.result = result;
                job.error = error;
                job.updated_at = chrono::Utc::now();
            }
            Ok(())
        }
        async fn reclaim_abandoned(&self) -> Result<Vec<Job>> {
            Ok(vec![])
        }
        async fn cancel(&self, _job_id: Uuid) -> Result<bool> {
            Ok(false)
        }
        async fn get(&self, job_id: Uuid) -> Result<Job> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .get(&job_id)
                .cloned()
                .unwrap_or_else(|| sample_job(job_id)))
        }
        async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>> {
            let by_key = self.by_key.lock().unwrap();
            let jobs = self.jobs.lock().unwrap();
            Ok(by_key.get(key).and_then(|id| jobs.get(id).cloned()))
        }
        async fn clean_expired_idempotency_keys(&self) -> Result<u64> {
            Ok(0)
        }
        async fn create_retry(
            &self,
            job_type: JobType,
            idempotency_key: &str,
            params: Value,
            retry_of: Uuid,
        ) -> Result<Uuid> {
            let id = Uuid::new_v4();
            let mut job = sample_job(id);
            job.job_type = job_type;
            job.params = params;
            job.idempotency_key = Some(idempotency_key.to_string());
            job.retry_of = Some(retry_of);
            self.by_key
                .lock()
                .unwrap()
                .insert(idempotency_key.to_string(), id);
            self.jobs.lock().unwrap().insert(id, job);
            Ok(id)
        }
        async fn queue_counts(&self) -> Result<waypoint_core::traits::QueueCounts> {
            let jobs = self.jobs.lock().unwrap();
            let mut counts = waypoint_core::traits::QueueCounts::default();
            for job in jobs.values() {
                match job.status {
                    JobStatus::Queued => counts.queued += 1,
                    JobStatus::Running => counts.running += 1,
                    JobStatus::Succeeded => counts.succeeded += 1,
                    JobStatus::Failed | JobStatus::Canceled => counts.failed += 1,
                }
            }
            Ok(counts)
        }
    }

    #[tokio::test]
    async fn equivalent_submissions_reuse_the_same_job() {
        let jobs: Arc<dyn JobRepository> = Arc::new(FakeJobs::default());
        let params = serde_json::json!({"query": "What is Rust?"});

        let first = submit(&jobs, &null_events(), JobType::Research, params.clone(), false).await.unwrap();
        assert!(first.is_new());

        let second = submit(&jobs, &null_events(), JobType::Research, params, false).await.unwrap();
        assert!(!second.is_new());
        assert_eq!(first.job_id(), second.job_id());
        assert!(matches!(second, SubmissionOutcome::Existing(_)));
    }

    #[tokio::test]
    async fn force_new_bypasses_reuse() {
        let jobs: Arc<dyn JobRepository> = Arc::new(FakeJobs::default());
        let params = serde_json::json!({"query": "What is Rust?"});

        let first = submit(&jobs, &null_events(), JobType::Research, params.clone(), false).await.unwrap();
        let second = submit(&jobs, &null_events(), JobType::Research, params, true).await.unwrap();

        assert!(second.is_new());
        assert_ne!(first.job_id(), second.job_id());
    }

    #[tokio::test]
    async fn different_queries_create_different_jobs() {
        let jobs: Arc<dyn JobRepository> = Arc::new(FakeJobs::default());

        let first = submit(&jobs, &null_events(), JobType::Research, serde_json::json!({"query": "a"}), false)
            .await
            .unwrap();
        let second = submit(&jobs, &null_events(), JobType::Research, serde_json::json!({"query": "b"}), false)
            .await
            .unwrap();

        assert_ne!(first.job_id(), second.job_id());
    }

    #[tokio::test]
    async fn succeeded_job_returns_cached_result() {
        let jobs: Arc<dyn JobRepository> = Arc::new(FakeJobs::default());
        let params = serde_json::json!({"query": "cached?"});

        let first = submit(&jobs, &null_events(), JobType::Research, params.clone(), false).await.unwrap();
        jobs.finish(
            first.job_id(),
            JobStatus::Succeeded,
            Some(serde_json::json!({"report_id": 1})),
            None,
        )
        .await
        .unwrap();

        let second = submit(&jobs, &null_events(), JobType::Research, params, false).await.unwrap();
        match second {
            SubmissionOutcome::Cached { job_id, result } => {
                assert_eq!(job_id, first.job_id());
                assert_eq!(result, Some(serde_json::json!({"report_id": 1})));
            }
            other => panic!("expected Cached, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_job_within_window_creates_linked_retry() {
        let jobs: Arc<dyn JobRepository> = Arc::new(FakeJobs::default());
        let params = serde_json::json!({"query": "flaky"});

        let first = submit(&jobs, &null_events(), JobType::Research, params.clone(), false).await.unwrap();
        jobs.finish(first.job_id(), JobStatus::Failed, None, Some("boom".into()))
            .await
            .unwrap();

        let second = submit(&jobs, &null_events(), JobType::Research, params, false).await.unwrap();
        match second {
            SubmissionOutcome::RetriedAsNew { job_id, retry_of } => {
                assert_ne!(job_id, first.job_id());
                assert_eq!(retry_of, first.job_id());
            }
            other => panic!("expected RetriedAsNew, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn canceled_job_always_creates_linked_retry() {
        let jobs: Arc<dyn JobRepository> = Arc::new(FakeJobs::default());
        let params = serde_json::json!({"query": "canceled"});

        let first = submit(&jobs, &null_events(), JobType::Research, params.clone(), false).await.unwrap();
        jobs.finish(first.job_id(), JobStatus::Canceled, None, None)
            .await
            .unwrap();

        let second = submit(&jobs, &null_events(), JobType::Research, params, false).await.unwrap();
        assert!(matches!(second, SubmissionOutcome::RetriedAsNew { .. }));
        assert_ne!(second.job_id(), first.job_id());
    }

    #[tokio::test]
    async fn fresh_enqueue_appends_submitted_then_ui_hint() {
        let jobs: Arc<dyn JobRepository> = Arc::new(FakeJobs::default());
        let recording = Arc::new(RecordingEvents::default());
        let events: Arc<dyn EventRepository> = recording.clone();
        let params = serde_json::json!({"query": "What is Rust?"});

        let outcome = submit(&jobs, &events, JobType::Research, params, false).await.unwrap();

        let appended = recording.appended.lock().unwrap();
        let this_job_events: Vec<EventType> = appended
            .iter()
            .filter(|(job_id, _)| *job_id == outcome.job_id())
            .map(|(_, event_type)| *event_type)
            .collect();
        assert_eq!(this_job_events, vec![EventType::Submitted, EventType::UiHint]);
    }

    #[tokio::test]
    async fn retried_job_appends_submitted_then_ui_hint() {
        let jobs: Arc<dyn JobRepository> = Arc::new(FakeJobs::default());
        let recording = Arc::new(RecordingEvents::default());
        let events: Arc<dyn EventRepository> = recording.clone();
        let params = serde_json::json!({"query": "flaky"});

        let first = submit(&jobs, &events, JobType::Research, params.clone(), false).await.unwrap();
        jobs.finish(first.job_id(), JobStatus::Failed, None, Some("boom".into()))
            .await
            .unwrap();

        let second = submit(&jobs, &events, JobType::Research, params, false).await.unwrap();

        let appended = recording.appended.lock().unwrap();
        let second_job_events: Vec<EventType> = appended
            .iter()
            .filter(|(job_id, _)| *job_id == second.job_id())
            .map(|(_, event_type)| *event_type)
            .collect();
        assert_eq!(second_job_events, vec![EventType::Submitted, EventType::UiHint]);
    }
}
