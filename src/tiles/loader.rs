//! Background tile download pipeline.
//!
//! Jobs flow through a FIFO channel to a fixed pool of worker threads. A
//! pending set keyed by destination path guarantees at most one in-flight
//! fetch per file: an entry is added together with the enqueue and removed
//! as the last step of the job, whatever its outcome. Failures are logged
//! and dropped; the tile simply stays absent until someone asks again.

use crate::core::geo::TileCoord;
use crate::prelude::HashMap;
use crate::tiles::disk::DiskTileStore;
use crate::tiles::fetcher::TileFetcher;
use crate::{MapError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Invoked from a worker thread with the path of each stored tile.
///
/// Callers whose state is not thread-safe must forward the path to their own
/// thread, e.g. through [`channel_callback`].
pub type TileReadyCallback = Arc<dyn Fn(&Path) + Send + Sync>;

/// Builds a callback that forwards ready paths into a channel the caller polls.
pub fn channel_callback() -> (TileReadyCallback, Receiver<PathBuf>) {
    let (tx, rx) = unbounded();
    let callback: TileReadyCallback = Arc::new(move |path: &Path| {
        // The receiver may be gone during teardown
        let _ = tx.send(path.to_path_buf());
    });
    (callback, rx)
}

/// One tile download, immutable once queued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub url: String,
    pub dest_path: PathBuf,
    pub key: TileCoord,
    /// Download even if `dest_path` already exists
    pub force_refetch: bool,
}

/// Terminal state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Stored,
    Skipped,
    Failed,
}

/// Counters of finished jobs
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub stored: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    stored: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// State shared between the pipeline handle and its workers
struct Shared {
    /// destination path -> whether the queued job forces a refetch
    pending: Mutex<HashMap<PathBuf, bool>>,
    store: DiskTileStore,
    fetcher: Arc<dyn TileFetcher>,
    callback: Option<TileReadyCallback>,
    counters: Counters,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, HashMap<PathBuf, bool>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Deduplicating worker pool that turns cache misses into stored tile files
pub struct TileFetchPipeline {
    shared: Arc<Shared>,
    job_tx: Option<Sender<FetchJob>>,
    workers: Vec<JoinHandle<()>>,
}

impl TileFetchPipeline {
    /// Starts `worker_count` workers (at least one).
    pub fn new(
        worker_count: usize,
        store: DiskTileStore,
        fetcher: Arc<dyn TileFetcher>,
        callback: Option<TileReadyCallback>,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::default()),
            store,
            fetcher,
            callback,
            counters: Counters::default(),
        });

        let (job_tx, job_rx) = unbounded::<FetchJob>();
        let workers = (0..worker_count.max(1))
            .map(|index| {
                let shared = Arc::clone(&shared);
                let job_rx = job_rx.clone();
                thread::Builder::new()
                    .name(format!("tile-fetch-{}", index))
                    .spawn(move || worker_loop(shared, job_rx))
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        log::debug!("tile fetch pipeline started with {} workers", workers.len());

        Ok(Self {
            shared,
            job_tx: Some(job_tx),
            workers,
        })
    }

    /// Queues a job unless one for the same destination is already in flight.
    ///
    /// Returns `Ok(true)` when the job was queued and `Ok(false)` when it was
    /// collapsed into an existing one.
    pub fn enqueue(&self, job: FetchJob) -> Result<bool> {
        let job_tx = self.job_tx.as_ref().ok_or(MapError::ShutDown)?;

        let mut pending = self.shared.pending();
        if pending.contains_key(&job.dest_path) {
            log::trace!("already queued: {}", job.dest_path.display());
            return Ok(false);
        }

        log::debug!("queue tile {:?} from {}", job.key, job.url);
        let dest_path = job.dest_path.clone();
        pending.insert(dest_path.clone(), job.force_refetch);
        if job_tx.send(job).is_err() {
            // All workers are gone
            pending.remove(&dest_path);
            return Err(MapError::ShutDown);
        }
        Ok(true)
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.shared.pending().contains_key(path)
    }

    /// True while a forced refetch of `path` is queued or running
    pub fn is_force_pending(&self, path: &Path) -> bool {
        self.shared.pending().get(path).copied().unwrap_or(false)
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending().len()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn stats(&self) -> PipelineStats {
        let counters = &self.shared.counters;
        PipelineStats {
            stored: counters.stored.load(Ordering::Relaxed),
            skipped: counters.skipped.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.job_tx.is_none()
    }

    /// Stops accepting jobs, lets the workers finish everything already
    /// queued, and waits for them to exit.
    pub fn shutdown(&mut self) {
        if self.job_tx.take().is_none() && self.workers.is_empty() {
            return;
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("tile fetch worker panicked");
            }
        }
        log::debug!("tile fetch pipeline drained");
    }
}

impl Drop for TileFetchPipeline {
    fn drop(&mut self) {
        // Closing the channel lets detached workers drain and exit on their own
        self.job_tx.take();
    }
}

impl std::fmt::Debug for TileFetchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileFetchPipeline")
            .field("workers", &self.workers.len())
            .field("pending", &self.pending_count())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Clears a job's pending entry when dropped, including during a panic unwind.
struct PendingGuard<'a> {
    shared: &'a Shared,
    dest_path: &'a Path,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending().remove(self.dest_path);
    }
}

fn worker_loop(shared: Arc<Shared>, job_rx: Receiver<FetchJob>) {
    // recv() fails once the sender is dropped and the queue is empty
    while let Ok(job) = job_rx.recv() {
        log::debug!("dequeued tile {:?} ({} waiting)", job.key, job_rx.len());
        let _guard = PendingGuard {
            shared: &shared,
            dest_path: &job.dest_path,
        };

        // A panicking fetcher or callback fails the job, not the worker
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_job(&shared, &job)))
            .unwrap_or_else(|_| {
                log::error!("tile fetch for {:?} panicked", job.key);
                JobOutcome::Failed
            });
        let counter = match outcome {
            JobOutcome::Stored => &shared.counters.stored,
            JobOutcome::Skipped => &shared.counters.skipped,
            JobOutcome::Failed => &shared.counters.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

fn run_job(shared: &Shared, job: &FetchJob) -> JobOutcome {
    // The file may have appeared between enqueue and dequeue
    if !job.force_refetch && shared.store.exists(&job.dest_path) {
        log::debug!("already on disk: {}", job.dest_path.display());
        return JobOutcome::Skipped;
    }

    let bytes = match shared.fetcher.fetch(&job.url) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("failed to download tile {:?}: {}", job.key, e);
            return JobOutcome::Failed;
        }
    };

    if let Err(e) = shared.store.write_atomic(&job.dest_path, &bytes) {
        log::error!("failed to store tile {}: {}", job.dest_path.display(), e);
        return JobOutcome::Failed;
    }

    log::debug!(
        "stored tile {:?} ({} bytes) at {}",
        job.key,
        bytes.len(),
        job.dest_path.display()
    );
    if let Some(callback) = &shared.callback {
        callback(&job.dest_path);
    }
    JobOutcome::Stored
}
