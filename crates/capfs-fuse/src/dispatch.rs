//! Worker pool for blocking file I/O.
//!
//! The FUSE session thread hands read, write and release requests to a
//! fixed set of worker threads so a slow backing file cannot hold up
//! unrelated requests. Each job owns its kernel reply and answers it when
//! done.
//!
//! - Fixed number of worker threads
//! - Bounded submission queue; when it is full the job runs on the
//!   submitting thread instead, which slows the session down rather than
//!   failing the request
//! - Zero workers means every job runs inline

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

/// Default number of I/O worker threads.
pub const DEFAULT_WORKER_THREADS: usize = 8;

/// Default capacity of the submission queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// A unit of work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Counters for the pool.
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Jobs accepted by the queue.
    pub jobs_submitted: AtomicU64,
    /// Jobs run on the submitting thread.
    pub jobs_inline: AtomicU64,
    /// Jobs that finished (either way).
    pub jobs_completed: AtomicU64,
    /// Jobs that panicked.
    pub jobs_panicked: AtomicU64,
}

/// A fixed-size pool of worker threads fed from a bounded queue.
pub struct WorkerPool {
    submit_tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<PoolStats>,
    capacity: usize,
}

impl WorkerPool {
    /// Starts `threads` workers sharing a queue of `capacity` jobs.
    pub fn new(threads: usize, capacity: usize) -> io::Result<Self> {
        let stats = Arc::new(PoolStats::default());
        if threads == 0 {
            debug!("worker pool disabled, running jobs inline");
            return Ok(Self {
                submit_tx: None,
                workers: Vec::new(),
                stats,
                capacity: 0,
            });
        }

        let (submit_tx, submit_rx) = bounded::<Job>(capacity.max(1));
        let mut workers = Vec::with_capacity(threads);
        for worker_id in 0..threads {
            let rx = submit_rx.clone();
            let stats = Arc::clone(&stats);
            let handle = thread::Builder::new()
                .name(format!("capfs-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, &rx, &stats))?;
            workers.push(handle);
        }

        info!(threads, capacity, "worker pool started");
        Ok(Self {
            submit_tx: Some(submit_tx),
            workers,
            stats,
            capacity,
        })
    }

    /// Runs `f` on a worker, or on the calling thread when the pool is
    /// disabled, full or shut down.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(tx) = &self.submit_tx else {
            self.run_inline(Box::new(f));
            return;
        };
        match tx.try_send(Box::new(f)) {
            Ok(()) => {
                self.stats.jobs_submitted.fetch_add(1, Ordering::Relaxed);
                trace!("job submitted to worker pool");
            }
            Err(TrySendError::Full(job)) => {
                warn!(capacity = self.capacity, "worker queue full, running job inline");
                self.run_inline(job);
            }
            Err(TrySendError::Disconnected(job)) => {
                error!("worker channel disconnected, running job inline");
                self.run_inline(job);
            }
        }
    }

    fn run_inline(&self, job: Job) {
        self.stats.jobs_inline.fetch_add(1, Ordering::Relaxed);
        run_job(job, &self.stats);
    }

    /// Number of worker threads (0 when jobs run inline).
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Stops accepting jobs, lets queued jobs finish and joins the workers.
    pub fn shutdown(&mut self) {
        if self.submit_tx.take().is_none() {
            return;
        }
        debug!("waiting for workers to finish");
        for handle in std::mem::take(&mut self.workers) {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
        info!("worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_job(job: Job, stats: &PoolStats) {
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        stats.jobs_panicked.fetch_add(1, Ordering::Relaxed);
        error!("job panicked");
    }
    stats.jobs_completed.fetch_add(1, Ordering::Relaxed);
}

fn worker_loop(worker_id: usize, rx: &Receiver<Job>, stats: &PoolStats) {
    debug!(worker_id, "worker started");
    // Ends once every sender is dropped and the queue is drained
    for job in rx {
        run_job(job, stats);
    }
    debug!(worker_id, "worker exiting");
}
