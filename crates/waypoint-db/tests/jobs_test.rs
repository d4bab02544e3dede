//! Integration tests for the job queue and its event journal.

use waypoint_core::{EventRepository, EventType, JobRepository, JobStatus, JobType};
use waypoint_db::test_fixtures::TestDatabase;

#[tokio::test]
#[ignore] // Requires database connection with migrations applied
async fn test_enqueue_and_claim() {
    let test_db = TestDatabase::new().await;

    let job_id = test_db
        .db
        .jobs
        .enqueue(JobType::Research, None, serde_json::json!({"query": "rust async"}))
        .await
        .expect("enqueue failed");

    let claimed = test_db
        .db
        .jobs
        .claim_next()
        .await
        .expect("claim failed")
        .expect("expected a job to claim");

    assert_eq!(claimed.id, job_id);
    assert_eq!(claimed.status, JobStatus::Running);
    assert_eq!(claimed.attempt, 1);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_enqueue_is_idempotent() {
    let test_db = TestDatabase::new().await;

    let first = test_db
        .db
        .jobs
        .enqueue(JobType::Research, Some("dedup-key"), serde_json::json!({}))
        .await
        .expect("first enqueue failed");
    let second = test_db
        .db
        .jobs
        .enqueue(JobType::Research, Some("dedup-key"), serde_json::json!({}))
        .await
        .expect("second enqueue failed");

    assert_eq!(first, second, "same idempotency key must resolve to the same job");

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_finish_appends_terminal_event() {
    let test_db = TestDatabase::new().await;

    let job_id = test_db
        .db
        .jobs
        .enqueue(JobType::Research, None, serde_json::json!({}))
        .await
        .unwrap();
    test_db.db.jobs.claim_next().await.unwrap();

    test_db
        .db
        .jobs
        .finish(job_id, JobStatus::Succeeded, Some(serde_json::json!({"ok": true})), None)
        .await
        .expect("finish failed");

    let job = test_db.db.jobs.get(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);

    let events = test_db.db.jobs.events_since(job_id, 0).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == EventType::Completed));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_cancel_queued_job() {
    let test_db = TestDatabase::new().await;

    let job_id = test_db
        .db
        .jobs
        .enqueue(JobType::Research, None, serde_json::json!({}))
        .await
        .unwrap();

    let canceled = test_db.db.jobs.cancel(job_id).await.unwrap();
    assert!(canceled);

    let job = test_db.db.jobs.get(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Canceled);

    let again = test_db.db.jobs.cancel(job_id).await.unwrap();
    assert!(!again, "cancelling an already-terminal job is a no-op");

    test_db.cleanup().await;
}
