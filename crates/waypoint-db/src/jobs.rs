//! Job queue and event journal repository implementation.
//!
//! `PgJobRepository` backs both `JobRepository` (claim/heartbeat/finish,
//! the queue primitives) and `EventRepository` (the append-only
//! `job_events` journal) since they share the same `jobs` row and are
//! always used together by the worker.

use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use waypoint_core::{
    defaults, new_v7, EventRepository, EventType, Error, Job, JobRepository, JobStatus, JobType,
    QueueCounts, Result,
};

/// PostgreSQL implementation of `JobRepository` + `EventRepository`.
pub struct PgJobRepository {
    pool: Pool<Postgres>,
}

impl PgJobRepository {
    /// Create a new PgJobRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_job_row(row: sqlx::postgres::PgRow) -> Result<Job> {
        let job_type_str: String = row.get("job_type");
        let status_str: String = row.get("status");
        Ok(Job {
            id: row.get("id"),
            job_type: job_type_str.parse::<JobType>()?,
            status: status_str.parse::<JobStatus>()?,
            params: row.get("params"),
            idempotency_key: row.get("idempotency_key"),
            idempotency_expires_at: row.get("idempotency_expires_at"),
            retry_of: row.get("retry_of"),
            result: row.get("result"),
            error: row.get("error"),
            attempt: row.get("attempt"),
            lease_expires_at: row.get("lease_expires_at"),
            heartbeat_at: row.get("heartbeat_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait::async_trait]
impl JobRepository for PgJobRepository {
    async fn enqueue(
        &self,
        job_type: JobType,
        idempotency_key: Option<&str>,
        params: serde_json::Value,
    ) -> Result<Uuid> {
        let now = Utc::now();

        // TOCTOU-safe: only one concurrent enqueue with the same key wins the
        // row; everyone else's INSERT no-ops via WHERE NOT EXISTS and we fall
        // through to re-read the surviving row's id.
        if let Some(key) = idempotency_key {
            let job_id = new_v7();
            let expires_at = now + chrono::Duration::seconds(defaults::IDEMPOTENCY_TTL_SECS);

            let inserted = sqlx::query_scalar::<_, Uuid>(
                "INSERT INTO jobs (id, job_type, status, params, idempotency_key, idempotency_expires_at, attempt, created_at, updated_at)
                 SELECT $1, $2, 'queued', $3, $4, $5, 0, $6, $6
                 WHERE NOT EXISTS (
                     SELECT 1 FROM jobs
                     WHERE idempotency_key = $4 AND idempotency_expires_at > $6
                 )
                 RETURNING id",
            )
            .bind(job_id)
            .bind(job_type.as_str())
            .bind(&params)
            .bind(key)
            .bind(expires_at)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

            if let Some(id) = inserted {
                return Ok(id);
            }

            let existing: Uuid = sqlx::query_scalar(
                "SELECT id FROM jobs WHERE idempotency_key = $1 AND idempotency_expires_at > $2",
            )
            .bind(key)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(existing)
        } else {
            let job_id = new_v7();
            sqlx::query(
                "INSERT INTO jobs (id, job_type, status, params, attempt, created_at, updated_at)
                 VALUES ($1, $2, 'queued', $3, 0, $4, $4)",
            )
            .bind(job_id)
            .bind(job_type.as_str())
            .bind(&params)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(job_id)
        }
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        let now = Utc::now();
        let lease_expires_at = now + chrono::Duration::seconds(defaults::LEASE_DURATION_SECS);

        // FOR UPDATE SKIP LOCKED lets every worker poll the same table
        // concurrently without serializing on a single row; filtering by
        // status and lease expiry before the lock picks up both freshly
        // queued jobs and ones abandoned by a dead worker.
        let row = sqlx::query(
            "UPDATE jobs
             SET status = 'running', lease_expires_at = $1, heartbeat_at = $2,
                 attempt = attempt + 1, updated_at = $2
             WHERE id = (
                 SELECT id FROM jobs
                 WHERE status = 'queued'
                    OR (status = 'running' AND lease_expires_at < $2)
                 ORDER BY created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, job_type, status, params, idempotency_key, idempotency_expires_at, retry_of,
                       result, error, attempt, lease_expires_at, heartbeat_at, created_at, updated_at",
        )
        .bind(lease_expires_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn heartbeat(&self, job_id: Uuid) -> Result<()> {
        let now = Utc::now();
        let lease_expires_at = now + chrono::Duration::seconds(defaults::LEASE_DURATION_SECS);
        let idempotency_floor = now + chrono::Duration::seconds(defaults::IDEMPOTENCY_TTL_SECS);

        sqlx::query(
            "UPDATE jobs
             SET heartbeat_at = $1, lease_expires_at = $2, updated_at = $1,
                 idempotency_expires_at = GREATEST(idempotency_expires_at, $3)
             WHERE id = $4",
        )
        .bind(now)
        .bind(lease_expires_at)
        .bind(idempotency_floor)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn finish(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<()> {
        let now = Utc::now();

        let event_type = match status {
            JobStatus::Succeeded => EventType::Completed,
            JobStatus::Failed => EventType::Error,
            JobStatus::Canceled => EventType::Canceled,
            JobStatus::Queued | JobStatus::Running => {
                return Err(Error::Job(format!(
                    "finish() called with non-terminal status {status}"
                )))
            }
        };

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            "UPDATE jobs SET status = $1, result = $2, error = $3, updated_at = $4 WHERE id = $5",
        )
        .bind(status.as_str())
        .bind(&result)
        .bind(&error)
        .bind(now)
        .bind(job_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let payload = serde_json::json!({ "result": result, "error": error });
        sqlx::query(
            "INSERT INTO job_events (job_id, event_type, payload, created_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(job_id)
        .bind(event_type.as_str())
        .bind(&payload)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn reclaim_abandoned(&self) -> Result<Vec<Job>> {
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let rows = sqlx::query(
            "UPDATE jobs
             SET status = 'queued', lease_expires_at = NULL, heartbeat_at = NULL, updated_at = $1
             WHERE status = 'running' AND lease_expires_at < $1
             RETURNING id, job_type, status, params, idempotency_key, idempotency_expires_at, retry_of,
                       result, error, attempt, lease_expires_at, heartbeat_at, created_at, updated_at",
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let jobs: Vec<Job> = rows
            .into_iter()
            .map(Self::parse_job_row)
            .collect::<Result<_>>()?;

        for job in &jobs {
            sqlx::query(
                "INSERT INTO job_events (job_id, event_type, payload, created_at)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(job.id)
            .bind(EventType::Abandoned.as_str())
            .bind(serde_json::json!({ "attempt": job.attempt }))
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(jobs)
    }

    async fn cancel(&self, job_id: Uuid) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE jobs SET status = 'canceled', updated_at = $1
             WHERE id = $2 AND status IN ('queued', 'running')",
        )
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, job_id: Uuid) -> Result<Job> {
        let row = sqlx::query(
            "SELECT id, job_type, status, params, idempotency_key, idempotency_expires_at, retry_of,
                    result, error, attempt, lease_expires_at, heartbeat_at, created_at, updated_at
             FROM jobs WHERE id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::JobNotFound(job_id))?;
        Self::parse_job_row(row)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>> {
        let now = Utc::now();
        let row = sqlx::query(
            "SELECT id, job_type, status, params, idempotency_key, idempotency_expires_at, retry_of,
                    result, error, attempt, lease_expires_at, heartbeat_at, created_at, updated_at
             FROM jobs WHERE idempotency_key = $1 AND idempotency_expires_at > $2",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        row.map(Self::parse_job_row).transpose()
    }

    async fn clean_expired_idempotency_keys(&self) -> Result<u64> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE jobs SET idempotency_key = NULL
             WHERE idempotency_key IS NOT NULL AND idempotency_expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn create_retry(
        &self,
        job_type: JobType,
        idempotency_key: &str,
        params: serde_json::Value,
        retry_of: Uuid,
    ) -> Result<Uuid> {
        let now = Utc::now();
        let job_id = new_v7();
        let expires_at = now + chrono::Duration::seconds(defaults::IDEMPOTENCY_TTL_SECS);

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Clear the predecessor's key first so the new row's insert never
        // collides with the at-most-one-live-key invariant.
        sqlx::query("UPDATE jobs SET idempotency_key = NULL WHERE id = $1")
            .bind(retry_of)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO jobs (id, job_type, status, params, idempotency_key, idempotency_expires_at, retry_of, attempt, created_at, updated_at)
             VALUES ($1, $2, 'queued', $3, $4, $5, $6, 0, $7, $7)",
        )
        .bind(job_id)
        .bind(job_type.as_str())
        .bind(&params)
        .bind(idempotency_key)
        .bind(expires_at)
        .bind(retry_of)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(job_id)
    }

    async fn queue_counts(&self) -> Result<QueueCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(Error::Database)?;
            let n: i64 = row.try_get("n").map_err(Error::Database)?;
            match status.as_str() {
                "queued" => counts.queued = n,
                "running" => counts.running = n,
                "succeeded" => counts.succeeded = n,
                "failed" | "canceled" => counts.failed += n,
                _ => {}
            }
        }
        Ok(counts)
    }
}

#[async_trait::async_trait]
impl EventRepository for PgJobRepository {
    async fn append_event(
        &self,
        job_id: Uuid,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO job_events (job_id, event_type, payload, created_at)
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(job_id)
        .bind(event_type.as_str())
        .bind(&payload)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(id)
    }

    async fn events_since(&self, job_id: Uuid, since_id: i64) -> Result<Vec<waypoint_core::JobEvent>> {
        let rows = sqlx::query(
            "SELECT id, job_id, event_type, payload, created_at
             FROM job_events WHERE job_id = $1 AND id > $2 ORDER BY id ASC",
        )
        .bind(job_id)
        .bind(since_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter()
            .map(|row| {
                let event_type_str: String = row.get("event_type");
                Ok(waypoint_core::JobEvent {
                    id: row.get("id"),
                    job_id: row.get("job_id"),
                    event_type: parse_event_type(&event_type_str)?,
                    payload: row.get("payload"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    async fn delete_events_older_than(&self, older_than: chrono::Duration) -> Result<u64> {
        let cutoff = Utc::now() - older_than;
        let result = sqlx::query("DELETE FROM job_events WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}

fn parse_event_type(s: &str) -> Result<EventType> {
    match s {
        "submitted" => Ok(EventType::Submitted),
        "started" => Ok(EventType::Started),
        "progress" => Ok(EventType::Progress),
        "agent_started" => Ok(EventType::AgentStarted),
        "agent_completed" => Ok(EventType::AgentCompleted),
        "agent_usage" => Ok(EventType::AgentUsage),
        "synthesis_token" => Ok(EventType::SynthesisToken),
        "synthesis_error" => Ok(EventType::SynthesisError),
        "report_saved" => Ok(EventType::ReportSaved),
        "ui_hint" => Ok(EventType::UiHint),
        "abandoned" => Ok(EventType::Abandoned),
        "error" => Ok(EventType::Error),
        "completed" => Ok(EventType::Completed),
        "canceled" => Ok(EventType::Canceled),
        other => Err(Error::Internal(format!("unknown event_type in db: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_type_round_trips_every_variant() {
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
        for event_type in all {
            let parsed = parse_event_type(event_type.as_str()).unwrap();
            assert_eq!(parsed, event_type);
        }
    }

    #[test]
    fn test_parse_event_type_rejects_unknown() {
        assert!(parse_event_type("NotAThing").is_err());
    }
}
