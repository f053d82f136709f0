//! Bounded worker pool
//!
//! A fixed set of tokio tasks pulls work units from one bounded queue.
//! Each worker runs one unit at a time, so no more than `pool_size` units
//! execute concurrently. Submission never waits: when the queue is full the
//! caller gets [`PoolError::Saturated`] back immediately.
//!
//! Units return nothing. Anything a unit wants to report has to go through
//! a side channel (here, the notification hub).

mod runner;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_channel::TrySendError;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span};

/// One unit of work: an opaque future with no result
pub type WorkUnit = BoxFuture<'static, ()>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool saturated: {0} units already queued")]
    Saturated(usize),

    #[error("worker pool is shut down")]
    Closed,
}

/// Worker pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of units executing at once
    pub pool_size: usize,
    /// Units that may wait for a free worker before submissions are refused
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 5,
            queue_capacity: 64,
        }
    }
}

pub struct WorkerPool {
    queue: async_channel::Sender<WorkUnit>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    in_flight: Arc<AtomicUsize>,
    pool_size: usize,
}

impl WorkerPool {
    /// Spawn `pool_size` workers on the current tokio runtime
    pub fn start(config: PoolConfig) -> Self {
        let pool_size = config.pool_size.max(1);
        let queue_capacity = config.queue_capacity.max(1);
        let (queue, receiver) = async_channel::bounded(queue_capacity);
        let in_flight = Arc::new(AtomicUsize::new(0));

        let workers = (0..pool_size)
            .map(|worker_id| {
                let receiver = receiver.clone();
                let in_flight = in_flight.clone();
                tokio::spawn(
                    runner::run(worker_id, receiver, in_flight)
                        .instrument(info_span!("worker", worker_id)),
                )
            })
            .collect();

        info!(pool_size, queue_capacity, "Worker pool started");

        Self {
            queue,
            workers: Mutex::new(workers),
            in_flight,
            pool_size,
        }
    }

    /// Queue `unit` for execution without waiting for a free worker
    pub fn submit<F>(&self, unit: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.queue.try_send(Box::pin(unit)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PoolError::Saturated(self.queue.len())),
            Err(TrySendError::Closed(_)) => Err(PoolError::Closed),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Units currently executing
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Units waiting for a worker
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// True once [`shutdown`](Self::shutdown) has been called
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Stop accepting work, let workers drain the queue, and wait for them
    pub async fn shutdown(&self) {
        self.queue.close();

        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );

        for worker in workers {
            let _ = worker.await;
        }

        info!("Worker pool stopped");
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("pool_size", &self.pool_size)
            .field("in_flight", &self.in_flight())
            .field("queued", &self.queued())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::{Notify, oneshot};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_never_exceeds_pool_size() {
        let pool = WorkerPool::start(PoolConfig {
            pool_size: 3,
            queue_capacity: 32,
        });
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let current = current.clone();
            let peak = peak.clone();
            let completed = completed.clone();
            pool.submit(async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                completed.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.shutdown().await;

        assert_eq!(completed.load(Ordering::SeqCst), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_panicking_unit_releases_worker() {
        let pool = WorkerPool::start(PoolConfig {
            pool_size: 1,
            queue_capacity: 4,
        });

        pool.submit(async { panic!("corrupt input") }).unwrap();

        let (tx, rx) = oneshot::channel();
        pool.submit(async move {
            let _ = tx.send(());
        })
        .unwrap();

        tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("worker should survive a panicking unit")
            .unwrap();
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_submit_refuses_when_queue_full() {
        let pool = WorkerPool::start(PoolConfig {
            pool_size: 1,
            queue_capacity: 1,
        });
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        {
            let started = started.clone();
            let release = release.clone();
            pool.submit(async move {
                started.notify_one();
                release.notified().await;
            })
            .unwrap();
        }
        started.notified().await;
        assert_eq!(pool.in_flight(), 1);

        // Occupies the single queue slot
        pool.submit(async {}).unwrap();
        assert_eq!(pool.submit(async {}), Err(PoolError::Saturated(1)));

        release.notify_one();
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_after_shutdown() {
        let pool = WorkerPool::start(PoolConfig::default());
        assert!(!pool.is_closed());
        pool.shutdown().await;

        assert!(pool.is_closed());
        assert_eq!(pool.submit(async {}), Err(PoolError::Closed));
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let pool = WorkerPool::start(PoolConfig {
            pool_size: 2,
            queue_capacity: 16,
        });
        let completed = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let completed = completed.clone();
            pool.submit(async move {
                completed.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.shutdown().await;
        assert_eq!(completed.load(Ordering::SeqCst), 10);
    }
}
