//! Bounded fan-out executor.
//!
//! Replaces the implicit "fire tasks and let the runtime garbage-collect
//! the handles" pattern with an explicit submit/shutdown lifecycle: every
//! task holds a semaphore permit for its entire lifetime, and `shutdown`
//! awaits every spawned task before returning.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Runs futures with bounded concurrency, FIFO over submission order,
/// with lifecycle callbacks translating into `agent_started`/
/// `agent_completed` events.
pub struct BoundedExecutor {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl BoundedExecutor {
    /// `capacity` should be `ENSEMBLE_SIZE * PARALLELISM` (default 8).
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            tasks: JoinSet::new(),
        }
    }

    /// Submit a task. Blocks until a slot is free (oversubscription
    /// waits — every submission takes an explicit slot), then spawns
    /// it. `on_start` fires once the slot is acquired, `on_finish` once
    /// the future completes.
    pub async fn submit<F, Fut>(&mut self, on_start: impl FnOnce() + Send + 'static, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let permit = self.semaphore.clone().acquire_owned().await.expect("semaphore never closed");
        self.tasks.spawn(async move {
            on_start();
            task().await;
            drop(permit);
        });
    }

    /// Await every in-flight task. Panicking tasks are swallowed (a
    /// panic inside a sub-agent must not take down the whole batch);
    /// callers observe failure through whatever channel the task itself
    /// used to report its result (an `mpsc` sender, typically), not
    /// through this method's return value.
    pub async fn shutdown(mut self) {
        while self.tasks.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn bounds_concurrency_to_capacity() {
        let mut executor = BoundedExecutor::new(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let in_flight = in_flight.clone();
            let max_observed = max_observed.clone();
            executor
                .submit(
                    || {},
                    move || async move {
                        let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_observed.fetch_max(current, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    },
                )
                .await;
        }

        executor.shutdown().await;
        assert!(max_observed.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn on_start_fires_before_the_task_body() {
        let mut executor = BoundedExecutor::new(4);
        let started = Arc::new(AtomicUsize::new(0));
        let s = started.clone();
        executor
            .submit(move || { s.fetch_add(1, Ordering::SeqCst); }, || async {})
            .await;
        executor.shutdown().await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }
}
