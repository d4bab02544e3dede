//! Background lease-reclaim sweep: demotes abandoned `running` jobs back
//! to `queued`, preserving their attempt counter so retry limits still
//! apply.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use waypoint_core::{defaults, JobRepository};

/// Runs `JobRepository::reclaim_abandoned()` on a fixed interval until
/// the process shuts down.
pub async fn run_lease_sweeper(jobs: Arc<dyn JobRepository>, interval_secs: u64) {
    let interval = Duration::from_secs(interval_secs);
    loop {
        tokio::time::sleep(interval).await;
        match jobs.reclaim_abandoned().await {
            Ok(reclaimed) => {
                for job in &reclaimed {
                    warn!(job_id = %job.id, attempt = job.attempt, "reclaimed abandoned job lease");
                }
                if !reclaimed.is_empty() {
                    info!(count = reclaimed.len(), "lease sweep reclaimed jobs");
                }
            }
            Err(e) => {
                warn!(error = ?e, "lease sweep failed");
            }
        }
    }
}

/// Convenience wrapper using the shared `CLEANUP_INTERVAL_SECS` default.
pub fn spawn_lease_sweeper(jobs: Arc<dyn JobRepository>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_lease_sweeper(jobs, defaults::CLEANUP_INTERVAL_SECS))
}

/// Runs `JobRepository::clean_expired_idempotency_keys()` on a fixed
/// interval (spec.md §5 "A sweeper task runs every 600s ... to expire
/// sessions, idempotency keys, and abandoned job leases"). Clearing the
/// key rather than the row lets a later identical submission enqueue a
/// fresh job instead of colliding on the unique partial index.
pub async fn run_idempotency_sweeper(jobs: Arc<dyn JobRepository>, interval_secs: u64) {
    let interval = Duration::from_secs(interval_secs);
    loop {
        tokio::time::sleep(interval).await;
        match jobs.clean_expired_idempotency_keys().await {
            Ok(cleared) if cleared > 0 => info!(count = cleared, "cleared expired idempotency keys"),
            Ok(_) => {}
            Err(e) => warn!(error = ?e, "idempotency key sweep failed"),
        }
    }
}

/// Convenience wrapper using the shared `CLEANUP_INTERVAL_SECS` default.
pub fn spawn_idempotency_sweeper(jobs: Arc<dyn JobRepository>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_idempotency_sweeper(jobs, defaults::CLEANUP_INTERVAL_SECS))
}
