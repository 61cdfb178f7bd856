//! Retry ceilings, escalating backoff, and anti-bot pacing.
//!
//! Both requests of a job go through [`send_with_retry`]. A failed attempt is
//! classified into a [`RetryTrigger`]; the [`RetryPolicy`] then decides
//! whether another attempt is allowed and how long to wait first.
//!
//! # Delay Calculation
//!
//! ```text
//! delay = base_delay * attempt + uniform[0, max_jitter)
//! ```
//!
//! With defaults, waits are roughly 2-4s after the first attempt and 4-6s
//! after the second.
//!
//! # Example
//!
//! ```
//! use doihive_core::download::{RetryDecision, RetryPolicy, RetryTrigger};
//!
//! let policy = RetryPolicy::page();
//! match policy.should_retry(RetryTrigger::Forbidden, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use reqwest::{RequestBuilder, Response};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::constants::{PAGE_DELAY_MS, PAYLOAD_DELAY_MS};
use super::error::{DownloadError, Stage};

/// Default maximum attempts per request, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff unit, multiplied by the failed attempt number.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Upper bound (exclusive) of the random jitter added to each backoff.
const DEFAULT_MAX_JITTER: Duration = Duration::from_secs(2);

/// Landing pages get one retry on 404 to ride out mirror inconsistency.
const PAGE_NOT_FOUND_ATTEMPTS: u32 = 2;

/// What went wrong on a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryTrigger {
    /// Connection, DNS, TLS or timeout error.
    Transport,
    /// HTTP 403.
    Forbidden,
    /// HTTP 404.
    NotFound,
}

/// Decision on whether to retry a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number comes next (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Give up.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry ceilings and backoff for one request kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts for transport errors and 403.
    max_attempts: u32,
    /// Maximum attempts that may end on a 404 (1 means 404 is terminal).
    not_found_attempts: u32,
    /// Backoff unit.
    base_delay: Duration,
    /// Jitter bound.
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::page()
    }
}

impl RetryPolicy {
    /// Policy for landing page requests: 3 attempts, 404 retried once.
    #[must_use]
    pub fn page() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            not_found_attempts: PAGE_NOT_FOUND_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }

    /// Policy for payload requests: 3 attempts, 404 terminal.
    #[must_use]
    pub fn payload() -> Self {
        Self {
            not_found_attempts: 1,
            ..Self::page()
        }
    }

    /// Overrides the attempt ceiling (minimum 1).
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Overrides the backoff unit and jitter bound.
    #[must_use]
    pub fn with_delays(mut self, base_delay: Duration, max_jitter: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_jitter = max_jitter;
        self
    }

    /// Same ceilings with zero backoff, for tests and dry runs.
    #[must_use]
    pub fn without_delays(self) -> Self {
        self.with_delays(Duration::ZERO, Duration::ZERO)
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed with `trigger`.
    #[instrument(level = "trace", skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, trigger: RetryTrigger, attempt: u32) -> RetryDecision {
        let ceiling = match trigger {
            RetryTrigger::Transport | RetryTrigger::Forbidden => self.max_attempts,
            RetryTrigger::NotFound => self.not_found_attempts.min(self.max_attempts),
        };

        if attempt >= ceiling {
            debug!(attempt, ceiling, ?trigger, "retry ceiling reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({ceiling}) exhausted for {trigger:?}"),
            };
        }

        RetryDecision::Retry {
            delay: self.calculate_delay(attempt),
            attempt: attempt + 1,
        }
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt) + random_below(self.max_jitter)
    }
}

/// Random sleeps before each request so traffic does not look scripted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    page: (Duration, Duration),
    payload: (Duration, Duration),
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            page: (
                Duration::from_millis(PAGE_DELAY_MS.0),
                Duration::from_millis(PAGE_DELAY_MS.1),
            ),
            payload: (
                Duration::from_millis(PAYLOAD_DELAY_MS.0),
                Duration::from_millis(PAYLOAD_DELAY_MS.1),
            ),
        }
    }
}

impl Pacing {
    /// Custom inclusive ranges for both requests.
    #[must_use]
    pub fn new(page: (Duration, Duration), payload: (Duration, Duration)) -> Self {
        Self { page, payload }
    }

    /// No pacing at all.
    #[must_use]
    pub fn none() -> Self {
        Self::new((Duration::ZERO, Duration::ZERO), (Duration::ZERO, Duration::ZERO))
    }

    pub(crate) fn page_delay(&self) -> Duration {
        random_between(self.page)
    }

    pub(crate) fn payload_delay(&self) -> Duration {
        random_between(self.payload)
    }
}

fn random_between((min, max): (Duration, Duration)) -> Duration {
    if max <= min {
        return min;
    }
    let min_ms = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}

fn random_below(bound: Duration) -> Duration {
    let bound_ms = u64::try_from(bound.as_millis()).unwrap_or(u64::MAX);
    if bound_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..bound_ms))
}

/// Sleeps for `delay` unless the token fires first.
pub(crate) async fn pause(delay: Duration, cancel: &CancellationToken) -> Result<(), DownloadError> {
    if cancel.is_cancelled() {
        return Err(DownloadError::Cancelled);
    }
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(DownloadError::Cancelled),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

enum FailedAttempt {
    Transport(reqwest::Error),
    Forbidden,
    NotFound,
}

impl FailedAttempt {
    fn trigger(&self) -> RetryTrigger {
        match self {
            Self::Transport(_) => RetryTrigger::Transport,
            Self::Forbidden => RetryTrigger::Forbidden,
            Self::NotFound => RetryTrigger::NotFound,
        }
    }

    fn into_error(self, stage: Stage, url: &str, attempts: u32) -> DownloadError {
        match self {
            Self::Transport(source) => DownloadError::network(stage, url, attempts, source),
            Self::Forbidden => DownloadError::rate_limited(stage, url, attempts),
            Self::NotFound => DownloadError::not_found(stage, url, attempts),
        }
    }
}

/// Sends the request built by `build` until it returns HTTP 200 or the policy gives up.
///
/// Any status other than 200, 403 and 404 fails immediately.
#[instrument(level = "debug", skip(policy, cancel, build), fields(stage = %stage))]
pub(crate) async fn send_with_retry<F>(
    stage: Stage,
    url: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    build: F,
) -> Result<Response, DownloadError>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(attempt, "sending request");

        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DownloadError::Cancelled),
            sent = build().send() => sent,
        };

        let failed = match sent {
            Ok(response) => match response.status().as_u16() {
                200 => return Ok(response),
                403 => FailedAttempt::Forbidden,
                404 => FailedAttempt::NotFound,
                status => return Err(DownloadError::http_status(stage, url, status)),
            },
            Err(error) => FailedAttempt::Transport(error),
        };

        match policy.should_retry(failed.trigger(), attempt) {
            RetryDecision::Retry {
                delay,
                attempt: next_attempt,
            } => {
                info!(
                    url = %url,
                    attempt = next_attempt,
                    max_attempts = policy.max_attempts(),
                    delay_ms = delay.as_millis(),
                    trigger = ?failed.trigger(),
                    "retrying request"
                );
                pause(delay, cancel).await?;
            }
            RetryDecision::DoNotRetry { reason } => {
                debug!(url = %url, %reason, "not retrying request");
                return Err(failed.into_error(stage, url, attempt));
            }
        }
    }
}
