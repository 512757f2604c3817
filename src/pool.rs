//! Bounded worker pool on named OS threads.
//!
//! Turns call blocking collaborators, so they run on plain threads rather than
//! async tasks. Jobs are pulled from a `crossbeam-channel` queue in FIFO
//! order; the pool itself makes no ordering promise across concurrently
//! running jobs.

use crate::config::PoolConfig;
use crate::error::{Result, ZiraError};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, error, info};

/// A unit of work for the pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolShared {
    tx: Mutex<Option<Sender<Job>>>,
    capacity: Option<usize>,
}

/// Handle to a running pool. Clones share the same queue and threads.
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    size: usize,
}

impl WorkerPool {
    /// Start `config.workers` threads.
    ///
    /// # Errors
    ///
    /// Returns [`ZiraError::Pool`] if the size is zero or a thread cannot be
    /// spawned.
    pub fn start(config: &PoolConfig) -> Result<Self> {
        if config.workers == 0 {
            return Err(ZiraError::Pool("worker count must be at least 1".to_owned()));
        }
        if config.queue_capacity == Some(0) {
            return Err(ZiraError::Pool("queue capacity must be at least 1".to_owned()));
        }

        let (tx, rx) = match config.queue_capacity {
            Some(cap) => crossbeam_channel::bounded::<Job>(cap),
            None => crossbeam_channel::unbounded::<Job>(),
        };

        let mut workers = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let rx = rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("zira-worker-{index}"))
                .spawn(move || worker_loop(index, rx))
                .map_err(|e| ZiraError::Pool(format!("failed to spawn worker {index}: {e}")))?;
            workers.push(handle);
        }

        info!(
            workers = config.workers,
            queue_capacity = ?config.queue_capacity,
            "worker pool started"
        );

        Ok(Self {
            shared: Arc::new(PoolShared {
                tx: Mutex::new(Some(tx)),
                capacity: config.queue_capacity,
            }),
            workers: Arc::new(Mutex::new(workers)),
            size: config.workers,
        })
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue a job without blocking the caller.
    ///
    /// # Errors
    ///
    /// [`ZiraError::QueueSaturated`] when a bounded queue is full,
    /// [`ZiraError::ShuttingDown`] after [`close`](Self::close).
    pub fn submit(&self, job: Job) -> Result<()> {
        self.try_submit(job).map_err(|(err, _job)| err)
    }

    /// Like [`submit`](Self::submit) but hands the job back on failure.
    pub fn try_submit(&self, job: Job) -> std::result::Result<(), (ZiraError, Job)> {
        let guard = self.shared.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return Err((ZiraError::ShuttingDown, job));
        };
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => Err((
                ZiraError::QueueSaturated {
                    capacity: self.shared.capacity.unwrap_or(0),
                },
                job,
            )),
            Err(TrySendError::Disconnected(job)) => Err((ZiraError::ShuttingDown, job)),
        }
    }

    /// Stop accepting jobs, let queued jobs finish and join every worker.
    ///
    /// Idempotent. Must not be called from a worker thread.
    pub fn close(&self) {
        let dropped = self
            .shared
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if dropped.is_none() {
            return;
        }
        drop(dropped);

        let handles: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                error!("worker thread exited abnormally");
            }
        }
        info!("worker pool stopped");
    }
}

fn worker_loop(index: usize, rx: Receiver<Job>) {
    debug!(worker = index, "worker started");
    while let Ok(job) = rx.recv() {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!(worker = index, "job panicked; worker continues");
        }
    }
    debug!(worker = index, "worker exiting");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config(workers: usize, queue_capacity: Option<usize>) -> PoolConfig {
        PoolConfig {
            workers,
            queue_capacity,
        }
    }

    #[test]
    fn runs_every_job_before_close_returns() {
        let pool = WorkerPool::start(&config(3, None)).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let done = Arc::clone(&done);
            pool.submit(Box::new(move || {
                done.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }
        pool.close();
        assert_eq!(done.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn concurrency_never_exceeds_worker_count() {
        let pool = WorkerPool::start(&config(2, None)).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.submit(Box::new(move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
                running.fetch_sub(1, Ordering::SeqCst);
            }))
            .unwrap();
        }
        pool.close();
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn bounded_queue_rejects_when_full() {
        let pool = WorkerPool::start(&config(1, Some(1))).unwrap();
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);

        pool.submit(Box::new(move || {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
        }))
        .unwrap();
        started_rx.recv().unwrap();

        pool.submit(Box::new(|| {})).unwrap();
        let err = pool.submit(Box::new(|| {})).unwrap_err();
        assert!(matches!(err, ZiraError::QueueSaturated { capacity: 1 }));

        release_tx.send(()).unwrap();
        pool.close();
    }

    #[test]
    fn submit_after_close_is_rejected() {
        let pool = WorkerPool::start(&config(1, None)).unwrap();
        pool.close();
        pool.close();
        let err = pool.submit(Box::new(|| {})).unwrap_err();
        assert!(matches!(err, ZiraError::ShuttingDown));
    }

    #[test]
    fn panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::start(&config(1, None)).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        pool.submit(Box::new(|| panic!("bad job"))).unwrap();
        let r = Arc::clone(&ran);
        pool.submit(Box::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        pool.close();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(WorkerPool::start(&config(0, None)).is_err());
        assert!(WorkerPool::start(&config(1, Some(0))).is_err());
    }
}
