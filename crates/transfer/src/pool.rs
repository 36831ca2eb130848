//! Bounded worker pool for per-file upload tasks.
//!
//! At most `capacity` tasks run at once. [`WorkerPool::submit`] waits for a free
//! slot before spawning, so a large listing never turns into a large backlog of
//! spawned tasks. A panicking task is counted and does not take the pool down.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};

/// The pool no longer accepts tasks.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("worker pool is closed")]
pub struct PoolClosed;

/// Outcome counts returned by [`WorkerPool::wait`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    /// Tasks that ran to completion.
    pub completed: usize,
    /// Tasks that panicked.
    pub panicked: usize,
}

/// Tracks the number of running tasks and its high-water mark.
struct ActiveGuard {
    active: Arc<AtomicUsize>,
}

impl ActiveGuard {
    fn enter(active: Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now: usize = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { active }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct WorkerPool {
    capacity: usize,
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    report: PoolReport,
}

impl WorkerPool {
    /// Create a pool running at most `capacity` tasks (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity: usize = capacity.max(1);
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            tasks: JoinSet::new(),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            report: PoolReport::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks running right now.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of tasks observed running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Submit a task, waiting until a slot is free.
    ///
    /// # Errors
    /// Returns [`PoolClosed`] if the pool was closed.
    pub async fn submit<F>(&mut self, task: F) -> Result<(), PoolClosed>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit: OwnedSemaphorePermit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolClosed)?;

        while let Some(result) = self.tasks.try_join_next() {
            self.record(result);
        }

        let active: Arc<AtomicUsize> = self.active.clone();
        let peak: Arc<AtomicUsize> = self.peak.clone();
        self.tasks.spawn(async move {
            let _permit: OwnedSemaphorePermit = permit;
            let _guard: ActiveGuard = ActiveGuard::enter(active, &peak);
            task.await;
        });
        Ok(())
    }

    /// Stop accepting tasks. Pending [`submit`](Self::submit) calls fail.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Wait for every submitted task to finish.
    pub async fn wait(&mut self) -> PoolReport {
        while let Some(result) = self.tasks.join_next().await {
            self.record(result);
        }
        self.report
    }

    fn record(&mut self, result: Result<(), JoinError>) {
        match result {
            Ok(()) => self.report.completed += 1,
            Err(e) if e.is_panic() => {
                tracing::error!(error = %e, "Worker task panicked");
                self.report.panicked += 1;
            }
            Err(e) => tracing::debug!(error = %e, "Worker task aborted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_bounded_concurrency() {
        let mut pool: WorkerPool = WorkerPool::new(3);
        for _ in 0..12 {
            pool.submit(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
            })
            .await
            .unwrap();
            assert!(pool.active() <= 3);
        }

        let report: PoolReport = pool.wait().await;
        assert_eq!(report.completed, 12);
        assert_eq!(pool.peak(), 3);
        assert_eq!(pool.active(), 0);
    }

    #[tokio::test]
    async fn test_panicking_task_is_counted() {
        let mut pool: WorkerPool = WorkerPool::new(2);
        pool.submit(async { panic!("boom") }).await.unwrap();
        pool.submit(async {}).await.unwrap();

        let report: PoolReport = pool.wait().await;
        assert_eq!(report.panicked, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(pool.active(), 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_runs_one_at_a_time() {
        let mut pool: WorkerPool = WorkerPool::new(0);
        assert_eq!(pool.capacity(), 1);
        pool.submit(async {}).await.unwrap();
        assert_eq!(pool.wait().await.completed, 1);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects() {
        let mut pool: WorkerPool = WorkerPool::new(1);
        pool.close();
        assert_eq!(pool.submit(async {}).await, Err(PoolClosed));
    }
}
