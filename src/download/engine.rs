//! Worker pool that drives jobs through the retrieval pipeline.
//!
//! # Concurrency Model
//!
//! - Every job is enqueued up front into a channel sized to the job count
//! - Exactly `W` worker tasks pull from that one queue in FIFO order
//! - Each worker runs skip check, page, extraction, payload and commit for a job
//! - Outcomes stream through a second channel to a single collecting loop,
//!   the only writer of [`RunStatistics`]
//! - Jobs sharing an identifier are serialized by a per-identifier lock, so a
//!   duplicate sees the first job's committed file and skips
//!
//! Per-job failures never abort the run; only setup failures (invalid worker
//! count, unusable output directory) return [`EngineError`].
//!
//! # Example
//!
//! ```no_run
//! use doihive_core::download::{DownloadEngine, Job};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::for_workers(3)?;
//! let jobs = vec![Job::for_identifier("https://sci-hub.se", "10.1000/xyz123")];
//! let stats = engine.run(jobs, Path::new("./pdf")).await?;
//! println!("success: {}, skip: {}, failed: {}", stats.success, stats.skip, stats.failed);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::{HttpClient, TransportSettings};
use super::error::DownloadError;
use super::extract::extract_document_url;
use super::page::fetch_page;
use super::payload::fetch_payload;
use super::retry::{Pacing, RetryPolicy};
use super::sink::OutputSink;
use super::stats::{Aggregator, Job, Outcome, RunStatistics};

/// Minimum allowed worker count.
pub const MIN_WORKERS: usize = 1;

/// Maximum allowed worker count.
pub const MAX_WORKERS: usize = 100;

/// Default worker count if not specified.
pub const DEFAULT_WORKERS: usize = 3;

/// Errors that abort a whole run before or while dispatching.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid worker count provided.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidWorkers {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The output directory could not be created.
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        /// The output directory.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The shared HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Transport(#[from] reqwest::Error),

    /// The job queue closed while jobs were still being enqueued.
    #[error("job queue closed unexpectedly")]
    QueueClosed,
}

/// Hook invoked for every outcome as the collecting loop records it.
pub trait OutcomeObserver: Send + Sync {
    /// Called once per job, in completion order.
    fn on_outcome(&self, outcome: &Outcome);
}

impl<F> OutcomeObserver for F
where
    F: Fn(&Outcome) + Send + Sync,
{
    fn on_outcome(&self, outcome: &Outcome) {
        self(outcome);
    }
}

/// Concurrent retrieval engine.
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    workers: usize,
    client: HttpClient,
    pacing: Pacing,
    page_policy: RetryPolicy,
    payload_policy: RetryPolicy,
    cancel: CancellationToken,
}

impl DownloadEngine {
    /// Creates an engine running `workers` concurrent workers over `client`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidWorkers`] if the value is outside 1-100.
    ///
    /// # Example
    ///
    /// ```
    /// use doihive_core::download::{DownloadEngine, HttpClient, TransportSettings};
    ///
    /// let client = HttpClient::new(&TransportSettings::for_workers(3)).unwrap();
    /// let engine = DownloadEngine::new(3, client).unwrap();
    /// assert_eq!(engine.workers(), 3);
    /// ```
    #[instrument(level = "debug", skip(client))]
    pub fn new(workers: usize, client: HttpClient) -> Result<Self, EngineError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
            return Err(EngineError::InvalidWorkers { value: workers });
        }
        Ok(Self {
            workers,
            client,
            pacing: Pacing::default(),
            page_policy: RetryPolicy::page(),
            payload_policy: RetryPolicy::payload(),
            cancel: CancellationToken::new(),
        })
    }

    /// Creates an engine with a default transport pooled for `workers`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidWorkers`] or [`EngineError::Transport`].
    pub fn for_workers(workers: usize) -> Result<Self, EngineError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
            return Err(EngineError::InvalidWorkers { value: workers });
        }
        let client = HttpClient::new(&TransportSettings::for_workers(workers))?;
        Self::new(workers, client)
    }

    /// Replaces the anti-bot pacing.
    #[must_use]
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Replaces the page and payload retry policies.
    #[must_use]
    pub fn with_retry_policies(mut self, page: RetryPolicy, payload: RetryPolicy) -> Self {
        self.page_policy = page;
        self.payload_policy = payload;
        self
    }

    /// Uses `cancel` to interrupt runs.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the configured worker count.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Returns the cancellation token runs observe.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Processes every job and returns the run's statistics.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OutputDir`] if `output_dir` cannot be created.
    /// Individual job failures do NOT cause this method to error.
    pub async fn run(&self, jobs: Vec<Job>, output_dir: &Path) -> Result<RunStatistics, EngineError> {
        self.run_with_observer(jobs, output_dir, &|_: &Outcome| {})
            .await
    }

    /// Like [`run`](Self::run), calling `observer` for each outcome.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OutputDir`] if `output_dir` cannot be created.
    #[instrument(skip(self, jobs, observer), fields(jobs = jobs.len(), workers = self.workers, output_dir = %output_dir.display()))]
    pub async fn run_with_observer(
        &self,
        jobs: Vec<Job>,
        output_dir: &Path,
        observer: &dyn OutcomeObserver,
    ) -> Result<RunStatistics, EngineError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| EngineError::OutputDir {
                path: output_dir.to_path_buf(),
                source,
            })?;

        let started = Instant::now();
        let expected = jobs.len();
        let mut aggregator = Aggregator::default();
        if expected == 0 {
            return Ok(aggregator.finish(started.elapsed()));
        }

        info!("starting run");

        let (job_tx, job_rx) = mpsc::channel::<QueuedJob>(expected);
        for job in jobs {
            job_tx
                .try_send(QueuedJob {
                    job,
                    enqueued: Instant::now(),
                })
                .map_err(|_| EngineError::QueueClosed)?;
        }
        drop(job_tx);

        let queue = Arc::new(Mutex::new(job_rx));
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<Outcome>(expected);
        let context = Arc::new(WorkerContext {
            client: self.client.clone(),
            sink: OutputSink::new(output_dir),
            pacing: self.pacing,
            page_policy: self.page_policy.clone(),
            payload_policy: self.payload_policy.clone(),
            cancel: self.cancel.clone(),
            in_flight: DashMap::new(),
        });

        let handles: Vec<_> = (0..self.workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&context),
                    Arc::clone(&queue),
                    outcome_tx.clone(),
                ))
            })
            .collect();
        drop(outcome_tx);

        while let Some(outcome) = outcome_rx.recv().await {
            observer.on_outcome(&outcome);
            aggregator.record(outcome);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task panicked");
            }
        }

        if aggregator.recorded() != expected {
            warn!(
                expected,
                recorded = aggregator.recorded(),
                "some jobs produced no outcome"
            );
        }

        let stats = aggregator.finish(started.elapsed());
        info!(
            total = stats.total,
            success = stats.success,
            skip = stats.skip,
            failed = stats.failed,
            bytes = stats.total_bytes,
            "run complete"
        );
        Ok(stats)
    }
}

struct QueuedJob {
    job: Job,
    enqueued: Instant,
}

enum Retrieved {
    Saved(u64),
    AlreadyPresent(u64),
}

struct WorkerContext {
    client: HttpClient,
    sink: OutputSink,
    pacing: Pacing,
    page_policy: RetryPolicy,
    payload_policy: RetryPolicy,
    cancel: CancellationToken,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

async fn worker_loop(
    worker_id: usize,
    context: Arc<WorkerContext>,
    queue: Arc<Mutex<mpsc::Receiver<QueuedJob>>>,
    outcomes: mpsc::Sender<Outcome>,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(queued) = next else {
            break;
        };
        let outcome = context.process(queued).await;
        if outcomes.send(outcome).await.is_err() {
            warn!(worker_id, "outcome channel closed");
            break;
        }
    }
    debug!(worker_id, "worker finished");
}

impl WorkerContext {
    #[instrument(skip(self, queued), fields(identifier = %queued.job.identifier))]
    async fn process(&self, queued: QueuedJob) -> Outcome {
        let QueuedJob { job, enqueued } = queued;

        let lock = Arc::clone(self.in_flight.entry(job.identifier.clone()).or_default().value());
        let result = {
            let _guard = lock.lock().await;
            self.retrieve(&job).await
        };
        drop(lock);
        self.in_flight
            .remove_if(&job.identifier, |_, lock| Arc::strong_count(lock) == 1);

        let duration = enqueued.elapsed();
        match result {
            Ok(Retrieved::Saved(bytes)) => {
                info!(bytes, duration_ms = duration.as_millis(), "document saved");
                Outcome::success(&job.identifier, bytes, duration)
            }
            Ok(Retrieved::AlreadyPresent(bytes)) => {
                debug!(bytes, "skipped, output exists");
                Outcome::skip(&job.identifier, bytes, duration)
            }
            Err(error) => {
                warn!(url = %job.target_url, error = %error, kind = ?error.kind(), "job failed");
                Outcome::failed(&job.identifier, &error, duration)
            }
        }
    }

    async fn retrieve(&self, job: &Job) -> Result<Retrieved, DownloadError> {
        if self.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        if let Some(bytes) = self.sink.existing_size(&job.identifier).await {
            return Ok(Retrieved::AlreadyPresent(bytes));
        }

        let page_url =
            Url::parse(&job.target_url).map_err(|_| DownloadError::invalid_url(&job.target_url))?;
        let page = fetch_page(
            &self.client,
            &page_url,
            &self.page_policy,
            &self.pacing,
            &self.cancel,
        )
        .await?;

        let document_url = match extract_document_url(&page.markup, &page.url) {
            Ok(url) => url,
            Err(failure) => {
                self.sink.save_diagnostics(&job.identifier, &page.markup).await;
                return Err(failure.into());
            }
        };

        let staged = fetch_payload(
            &self.client,
            &document_url,
            &page.url,
            self.sink.dir(),
            &self.payload_policy,
            &self.pacing,
            &self.cancel,
        )
        .await?;
        debug!(bytes = staged.bytes(), "payload validated");

        staged
            .commit(&self.sink.path_for(&job.identifier))
            .map(Retrieved::Saved)
    }
}
