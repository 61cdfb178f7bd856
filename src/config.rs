//! Pipeline configuration with a JSON file layer.
//!
//! Values come from [`PipelineConfig::default`], then an optional JSON
//! file, then CLI flags. Every field of the file is optional:
//!
//! ```json
//! {
//!   "mirror": "https://sci-hub.se",
//!   "workers": 3,
//!   "page_delay_ms": [500, 2000],
//!   "batch_size": 50,
//!   "cool_down_secs": 120
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::batch::{BatchPlan, DEFAULT_ANOMALY_RUNS, DEFAULT_COOL_DOWN, DEFAULT_MAX_FAILURE_RATE};
use crate::download::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_WORKERS, MAX_WORKERS, MIN_WORKERS, Pacing, RetryPolicy,
    TransportSettings,
};

/// Default mirror base URL.
pub const DEFAULT_MIRROR: &str = "https://sci-hub.se";

/// Default output directory for retrieved documents.
pub const DEFAULT_PDF_DIR: &str = "./pdf";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for this schema.
    #[error("invalid config file {path}: {source}")]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A value is out of range.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Every tunable of a retrieval run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Mirror base URL; identifiers are appended as the path.
    pub mirror: String,
    /// Concurrent workers.
    pub workers: usize,
    /// Output directory for documents.
    pub pdf_dir: PathBuf,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Landing page request timeout in seconds.
    pub page_timeout_secs: u64,
    /// Payload request timeout in seconds.
    pub payload_timeout_secs: u64,
    /// Pacing range before page requests, in milliseconds.
    pub page_delay_ms: (u64, u64),
    /// Pacing range before payload requests, in milliseconds.
    pub payload_delay_ms: (u64, u64),
    /// Attempts per request for transport errors and 403.
    pub max_attempts: u32,
    /// Backoff unit in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Backoff jitter bound in milliseconds.
    pub retry_jitter_ms: u64,
    /// Jobs per batch slice; 0 = one slice.
    pub batch_size: usize,
    /// Cool-down between slices in seconds.
    pub cool_down_secs: u64,
    /// Anomaly rate that marks a slice as anomalous.
    pub max_failure_rate: f64,
    /// Consecutive anomalous slices before aborting.
    pub anomaly_runs: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let transport = TransportSettings::default();
        Self {
            mirror: DEFAULT_MIRROR.to_string(),
            workers: DEFAULT_WORKERS,
            pdf_dir: PathBuf::from(DEFAULT_PDF_DIR),
            connect_timeout_secs: transport.connect_timeout.as_secs(),
            page_timeout_secs: transport.page_timeout.as_secs(),
            payload_timeout_secs: transport.payload_timeout.as_secs(),
            page_delay_ms: (500, 2000),
            payload_delay_ms: (300, 1000),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: 2000,
            retry_jitter_ms: 2000,
            batch_size: 0,
            cool_down_secs: DEFAULT_COOL_DOWN.as_secs(),
            max_failure_rate: DEFAULT_MAX_FAILURE_RATE,
            anomaly_runs: DEFAULT_ANOMALY_RUNS,
        }
    }
}

impl PipelineConfig {
    /// Loads `path` over the defaults and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is unreadable, malformed or out of range.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Checks every value against the ranges the pipeline accepts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match Url::parse(&self.mirror) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {}
            _ => {
                return Err(ConfigError::invalid(
                    "mirror",
                    format!("{} is not an http(s) URL", self.mirror),
                ));
            }
        }
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.workers) {
            return Err(ConfigError::invalid(
                "workers",
                format!("{}. Expected range: {MIN_WORKERS}..={MAX_WORKERS}", self.workers),
            ));
        }
        for (field, secs) in [
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("page_timeout_secs", self.page_timeout_secs),
            ("payload_timeout_secs", self.payload_timeout_secs),
        ] {
            if !(1..=3600).contains(&secs) {
                return Err(ConfigError::invalid(
                    field,
                    format!("{secs}. Expected range: 1..=3600"),
                ));
            }
        }
        for (field, (min, max)) in [
            ("page_delay_ms", self.page_delay_ms),
            ("payload_delay_ms", self.payload_delay_ms),
        ] {
            if min > max {
                return Err(ConfigError::invalid(
                    field,
                    format!("lower bound {min} exceeds upper bound {max}"),
                ));
            }
        }
        if !(1..=10).contains(&self.max_attempts) {
            return Err(ConfigError::invalid(
                "max_attempts",
                format!("{}. Expected range: 1..=10", self.max_attempts),
            ));
        }
        if !(self.max_failure_rate > 0.0 && self.max_failure_rate <= 1.0) {
            return Err(ConfigError::invalid(
                "max_failure_rate",
                format!("{}. Expected range: (0, 1]", self.max_failure_rate),
            ));
        }
        if self.anomaly_runs == 0 {
            return Err(ConfigError::invalid("anomaly_runs", "must be at least 1"));
        }
        Ok(())
    }

    /// Transport settings with the pool sized to the worker count.
    #[must_use]
    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            page_timeout: Duration::from_secs(self.page_timeout_secs),
            payload_timeout: Duration::from_secs(self.payload_timeout_secs),
            pool_size: self.workers.max(1),
        }
    }

    /// Anti-bot pacing ranges.
    #[must_use]
    pub fn pacing(&self) -> Pacing {
        let range = |(min, max): (u64, u64)| (Duration::from_millis(min), Duration::from_millis(max));
        Pacing::new(range(self.page_delay_ms), range(self.payload_delay_ms))
    }

    /// Page and payload retry policies.
    #[must_use]
    pub fn retry_policies(&self) -> (RetryPolicy, RetryPolicy) {
        let base = Duration::from_millis(self.retry_base_delay_ms);
        let jitter = Duration::from_millis(self.retry_jitter_ms);
        (
            RetryPolicy::page()
                .with_max_attempts(self.max_attempts)
                .with_delays(base, jitter),
            RetryPolicy::payload()
                .with_max_attempts(self.max_attempts)
                .with_delays(base, jitter),
        )
    }

    /// Batch slicing and abort thresholds.
    #[must_use]
    pub fn batch_plan(&self) -> BatchPlan {
        BatchPlan {
            batch_size: self.batch_size,
            cool_down: Duration::from_secs(self.cool_down_secs),
            max_failure_rate: self.max_failure_rate,
            anomaly_runs: self.anomaly_runs,
        }
    }
}
