//! Jobs, per-job outcomes, and run-level statistics.
//!
//! [`RunStatistics`] has exactly one writer: the engine's collecting loop
//! feeds every [`Outcome`] through [`Aggregator::record`]. Workers never
//! touch counters directly.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::{DownloadError, FailureKind};
use super::sink::output_filename;

/// One unit of work: one identifier, one retrieval attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Landing page URL on the mirror.
    pub target_url: String,
    /// The DOI this job retrieves.
    pub identifier: String,
}

impl Job {
    /// Creates a job from explicit parts.
    #[must_use]
    pub fn new(target_url: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            identifier: identifier.into(),
        }
    }

    /// Job for `identifier` on the mirror at `mirror`.
    ///
    /// ```
    /// use doihive_core::download::Job;
    ///
    /// let job = Job::for_identifier("https://mirror.test/", "10.1000/xyz123");
    /// assert_eq!(job.target_url, "https://mirror.test/10.1000/xyz123");
    /// ```
    #[must_use]
    pub fn for_identifier(mirror: &str, identifier: &str) -> Self {
        Self::new(
            format!("{}/{identifier}", mirror.trim_end_matches('/')),
            identifier,
        )
    }

    /// Recovers the identifier from a target URL's path.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] if the URL does not parse or has an empty path.
    pub fn from_target_url(target_url: &str) -> Result<Self, DownloadError> {
        let parsed = Url::parse(target_url).map_err(|_| DownloadError::invalid_url(target_url))?;
        let raw = parsed.path().trim_start_matches('/');
        let identifier = urlencoding::decode(raw)
            .map_err(|_| DownloadError::invalid_url(target_url))?
            .into_owned();
        if identifier.is_empty() {
            return Err(DownloadError::invalid_url(target_url));
        }
        Ok(Self::new(target_url, identifier))
    }
}

/// Final status of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Document retrieved and committed.
    Success,
    /// Output already present; no network I/O.
    Skip,
    /// Job failed; see the reason.
    Failed,
}

/// The immutable result of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Final status.
    pub status: OutcomeStatus,
    /// The job's identifier.
    pub identifier: String,
    /// Deterministic output filename.
    pub output_name: String,
    /// Bytes committed (success) or found on disk (skip).
    pub byte_size: u64,
    /// Failure reason, set only for failed jobs.
    pub error_reason: Option<String>,
    /// Failure classification, set only for failed jobs.
    pub failure_kind: Option<FailureKind>,
    /// Time from enqueue to completion.
    pub duration: Duration,
}

impl Outcome {
    /// A successful retrieval.
    #[must_use]
    pub fn success(identifier: &str, byte_size: u64, duration: Duration) -> Self {
        Self::settled(OutcomeStatus::Success, identifier, byte_size, duration)
    }

    /// An idempotent skip.
    #[must_use]
    pub fn skip(identifier: &str, byte_size: u64, duration: Duration) -> Self {
        Self::settled(OutcomeStatus::Skip, identifier, byte_size, duration)
    }

    /// A failed job with its classified error.
    #[must_use]
    pub fn failed(identifier: &str, error: &DownloadError, duration: Duration) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            identifier: identifier.to_string(),
            output_name: output_filename(identifier),
            byte_size: 0,
            error_reason: Some(error.to_string()),
            failure_kind: Some(error.kind()),
            duration,
        }
    }

    fn settled(status: OutcomeStatus, identifier: &str, byte_size: u64, duration: Duration) -> Self {
        Self {
            status,
            identifier: identifier.to_string(),
            output_name: output_filename(identifier),
            byte_size,
            error_reason: None,
            failure_kind: None,
            duration,
        }
    }
}

/// One failed job as kept in the statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// The failed identifier.
    pub identifier: String,
    /// Human-readable reason.
    pub reason: String,
    /// Classification for pattern detection.
    pub kind: FailureKind,
}

/// Aggregate results of one engine run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Outcomes recorded.
    pub total: usize,
    /// Successful retrievals.
    pub success: usize,
    /// Idempotent skips.
    pub skip: usize,
    /// Failed jobs.
    pub failed: usize,
    /// Bytes committed by successful jobs.
    pub total_bytes: u64,
    /// Duration of every job, in completion order.
    pub durations: Vec<Duration>,
    /// Duration of successful jobs, in completion order.
    pub success_durations: Vec<Duration>,
    /// Failed jobs, in completion order.
    pub failures: Vec<FailureRecord>,
    /// Wall-clock time of the whole run.
    pub elapsed: Duration,
}

impl RunStatistics {
    /// Jobs that actually touched the network.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.total - self.skip
    }

    /// Failures whose kind hints at mirror push-back.
    #[must_use]
    pub fn anomaly_count(&self) -> usize {
        self.failures.iter().filter(|f| f.kind.is_anomaly()).count()
    }

    /// Count of failures of one kind.
    #[must_use]
    pub fn failures_of(&self, kind: FailureKind) -> usize {
        self.failures.iter().filter(|f| f.kind == kind).count()
    }

    /// Successes over total, as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.success as f64 / self.total as f64 * 100.0
    }

    /// Sum of all job durations.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.durations.iter().sum()
    }

    /// Mean duration over all jobs.
    #[must_use]
    pub fn mean_duration(&self) -> Option<Duration> {
        mean(&self.durations)
    }

    /// Mean duration over successful jobs.
    #[must_use]
    pub fn mean_success_duration(&self) -> Option<Duration> {
        mean(&self.success_durations)
    }

    /// Wall-clock time of the run divided by the job count.
    #[must_use]
    pub fn mean_time_per_job(&self) -> Option<Duration> {
        let count = u32::try_from(self.total).ok().filter(|&n| n > 0)?;
        Some(self.elapsed / count)
    }

    /// Folds another run's statistics into this one.
    pub fn merge(&mut self, other: &Self) {
        self.total += other.total;
        self.success += other.success;
        self.skip += other.skip;
        self.failed += other.failed;
        self.total_bytes += other.total_bytes;
        self.durations.extend_from_slice(&other.durations);
        self.success_durations
            .extend_from_slice(&other.success_durations);
        self.failures.extend(other.failures.iter().cloned());
        self.elapsed += other.elapsed;
    }
}

fn mean(durations: &[Duration]) -> Option<Duration> {
    let count = u32::try_from(durations.len()).ok().filter(|&n| n > 0)?;
    Some(durations.iter().sum::<Duration>() / count)
}

/// Sole writer of [`RunStatistics`] during a run.
#[derive(Debug, Default)]
pub(crate) struct Aggregator {
    stats: RunStatistics,
}

impl Aggregator {
    /// Folds one outcome into the statistics.
    pub(crate) fn record(&mut self, outcome: Outcome) {
        let stats = &mut self.stats;
        stats.total += 1;
        stats.durations.push(outcome.duration);
        match outcome.status {
            OutcomeStatus::Success => {
                stats.success += 1;
                stats.total_bytes += outcome.byte_size;
                stats.success_durations.push(outcome.duration);
            }
            OutcomeStatus::Skip => stats.skip += 1,
            OutcomeStatus::Failed => {
                stats.failed += 1;
                stats.failures.push(FailureRecord {
                    identifier: outcome.identifier,
                    reason: outcome.error_reason.unwrap_or_default(),
                    kind: outcome.failure_kind.unwrap_or(FailureKind::Transport),
                });
            }
        }
    }

    /// Outcomes recorded so far.
    pub(crate) fn recorded(&self) -> usize {
        self.stats.total
    }

    /// Finalizes the statistics with the run's wall-clock time.
    pub(crate) fn finish(mut self, elapsed: Duration) -> RunStatistics {
        self.stats.elapsed = elapsed;
        self.stats
    }
}
