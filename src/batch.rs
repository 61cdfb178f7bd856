//! Batch pacing driver layered over [`DownloadEngine`].
//!
//! Large identifier sets are processed in consecutive slices with a
//! cool-down between them. After each slice the driver inspects the
//! slice's [`RunStatistics`]; when rate limiting and bot challenges
//! dominate for several slices in a row, it stops instead of burning the
//! rest of the list against a mirror that is pushing back.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::download::{DownloadEngine, EngineError, Job, OutcomeObserver, RunStatistics};

/// Default cool-down between slices.
pub const DEFAULT_COOL_DOWN: Duration = Duration::from_secs(60);

/// Default anomaly rate that counts a slice as anomalous.
pub const DEFAULT_MAX_FAILURE_RATE: f64 = 0.5;

/// Default number of consecutive anomalous slices before aborting.
pub const DEFAULT_ANOMALY_RUNS: u32 = 2;

/// How a job list is sliced and when the driver gives up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPlan {
    /// Jobs per slice; 0 runs everything as one slice.
    pub batch_size: usize,
    /// Sleep between slices.
    pub cool_down: Duration,
    /// Anomaly rate at or above which a slice is anomalous.
    pub max_failure_rate: f64,
    /// Consecutive anomalous slices that abort the run.
    pub anomaly_runs: u32,
}

impl Default for BatchPlan {
    fn default() -> Self {
        Self {
            batch_size: 0,
            cool_down: DEFAULT_COOL_DOWN,
            max_failure_rate: DEFAULT_MAX_FAILURE_RATE,
            anomaly_runs: DEFAULT_ANOMALY_RUNS,
        }
    }
}

impl BatchPlan {
    /// Splits `jobs` into the slices this plan runs.
    #[must_use]
    pub fn slices(&self, jobs: Vec<Job>) -> Vec<Vec<Job>> {
        if jobs.is_empty() {
            return Vec::new();
        }
        if self.batch_size == 0 || self.batch_size >= jobs.len() {
            return vec![jobs];
        }
        let mut slices = Vec::with_capacity(jobs.len().div_ceil(self.batch_size));
        let mut rest = jobs.into_iter().peekable();
        while rest.peek().is_some() {
            slices.push(rest.by_ref().take(self.batch_size).collect());
        }
        slices
    }
}

/// Why the driver stopped before the last slice.
#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    /// Too many consecutive slices were dominated by push-back failures.
    Anomaly {
        /// Anomaly rate of the last slice.
        rate: f64,
        /// Consecutive anomalous slices observed.
        consecutive: u32,
    },
    /// The engine's cancellation token fired.
    Cancelled,
}

/// Everything the driver observed.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    /// Statistics of each slice that ran, in order.
    pub batches: Vec<RunStatistics>,
    /// All slices merged.
    pub total: RunStatistics,
    /// Set when the driver stopped early.
    pub aborted: Option<AbortReason>,
    /// Jobs never dispatched because of an abort.
    pub remaining: usize,
}

/// Share of attempted jobs (skips excluded) that failed with rate limiting or a bot challenge.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn anomaly_rate(stats: &RunStatistics) -> f64 {
    let attempted = stats.attempted();
    if attempted == 0 {
        return 0.0;
    }
    stats.anomaly_count() as f64 / attempted as f64
}

/// Runs `jobs` through `engine` slice by slice according to `plan`.
///
/// # Errors
///
/// Returns the [`EngineError`] of a slice that failed to start; per-job
/// failures only show up in the statistics.
#[instrument(skip(engine, jobs, plan, observer), fields(jobs = jobs.len(), batch_size = plan.batch_size))]
pub async fn run_batches(
    engine: &DownloadEngine,
    jobs: Vec<Job>,
    output_dir: &Path,
    plan: &BatchPlan,
    observer: &dyn OutcomeObserver,
) -> Result<BatchSummary, EngineError> {
    let mut remaining = jobs.len();
    let slices = plan.slices(jobs);
    let slice_count = slices.len();
    let cancel = engine.cancellation().clone();
    let mut summary = BatchSummary::default();
    let mut consecutive = 0u32;

    for (index, slice) in slices.into_iter().enumerate() {
        if index > 0 && !plan.cool_down.is_zero() {
            info!(
                cool_down_secs = plan.cool_down.as_secs(),
                next = index + 1,
                "cooling down before next batch"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => {},
                () = tokio::time::sleep(plan.cool_down) => {},
            }
        }
        if cancel.is_cancelled() {
            summary.aborted = Some(AbortReason::Cancelled);
            break;
        }

        info!(batch = index + 1, of = slice_count, jobs = slice.len(), remaining, "starting batch");
        remaining -= slice.len();
        let stats = engine.run_with_observer(slice, output_dir, observer).await?;

        let rate = anomaly_rate(&stats);
        if stats.attempted() > 0 && rate >= plan.max_failure_rate {
            consecutive += 1;
            warn!(batch = index + 1, rate, consecutive, "batch dominated by rate limiting or captchas");
        } else {
            consecutive = 0;
        }
        summary.total.merge(&stats);
        summary.batches.push(stats);

        if cancel.is_cancelled() {
            summary.aborted = Some(AbortReason::Cancelled);
            break;
        }
        if consecutive >= plan.anomaly_runs && index + 1 < slice_count {
            summary.aborted = Some(AbortReason::Anomaly { rate, consecutive });
            break;
        }
    }

    summary.remaining = remaining;
    if let Some(reason) = &summary.aborted {
        warn!(?reason, remaining, "batch run aborted");
    }
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use crate::download::{
        DownloadError, FailureKind, FailureRecord, HttpClient, Outcome, Pacing, RetryPolicy,
        Stage, TransportSettings,
    };
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::method;
    use wiremock::{Mock, ResponseTemplate};

    fn jobs(mirror: &str, n: usize) -> Vec<Job> {
        (0..n)
            .map(|i| Job::for_identifier(mirror, &format!("10.1000/{i}")))
            .collect()
    }

    fn quiet_engine() -> DownloadEngine {
        let client = HttpClient::new(&TransportSettings::default()).unwrap();
        DownloadEngine::new(2, client)
            .unwrap()
            .with_pacing(Pacing::none())
            .with_retry_policies(
                RetryPolicy::page().without_delays(),
                RetryPolicy::payload().without_delays(),
            )
    }

    fn plan(batch_size: usize) -> BatchPlan {
        BatchPlan {
            batch_size,
            cool_down: Duration::ZERO,
            ..BatchPlan::default()
        }
    }

    #[test]
    fn test_slices_split_consecutively() {
        let slices = plan(2).slices(jobs("http://m", 5));
        let sizes: Vec<usize> = slices.iter().map(Vec::len).collect();
        assert_eq!(sizes, [2, 2, 1]);
        assert_eq!(slices[2][0].identifier, "10.1000/4");

        assert_eq!(plan(0).slices(jobs("http://m", 5)).len(), 1);
        assert!(plan(3).slices(Vec::new()).is_empty());
    }

    #[test]
    fn test_anomaly_rate_ignores_skips() {
        let stats = RunStatistics {
            total: 4,
            skip: 2,
            failed: 2,
            failures: vec![
                FailureRecord {
                    identifier: "10.1/a".into(),
                    reason: "403".into(),
                    kind: FailureKind::RateLimited,
                },
                FailureRecord {
                    identifier: "10.1/b".into(),
                    reason: "timeout".into(),
                    kind: FailureKind::Transport,
                },
            ],
            ..RunStatistics::default()
        };
        assert!((anomaly_rate(&stats) - 0.5).abs() < f64::EPSILON);
        assert!(anomaly_rate(&RunStatistics::default()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_outcome_failure_feeds_anomaly_kind() {
        let outcome = Outcome::failed(
            "10.1/x",
            &DownloadError::rate_limited(Stage::Page, "http://m/10.1/x", 3),
            Duration::ZERO,
        );
        assert_eq!(outcome.failure_kind, Some(FailureKind::RateLimited));
    }

    #[tokio::test]
    async fn test_sustained_rate_limiting_aborts_after_consecutive_batches() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let summary = run_batches(
            &quiet_engine(),
            jobs(&mock_server.uri(), 6),
            temp.path(),
            &plan(2),
            &|_: &Outcome| {},
        )
        .await
        .unwrap();

        assert_eq!(summary.batches.len(), 2);
        assert_eq!(summary.remaining, 2);
        assert_eq!(summary.total.failed, 4);
        assert!(matches!(
            summary.aborted,
            Some(AbortReason::Anomaly { consecutive: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_next_batch() {
        let temp = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let engine = quiet_engine().with_cancellation(cancel);

        let summary = run_batches(
            &engine,
            jobs("http://127.0.0.1:9", 4),
            temp.path(),
            &plan(2),
            &|_: &Outcome| {},
        )
        .await
        .unwrap();

        assert_eq!(summary.aborted, Some(AbortReason::Cancelled));
        assert!(summary.batches.is_empty());
        assert_eq!(summary.remaining, 4);
    }
}
