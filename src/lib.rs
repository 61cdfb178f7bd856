//! DoiHive core library
//!
//! Retrieves documents for DOIs from a mirror site: a landing page is
//! fetched per identifier, the document link is extracted from it, and the
//! document is streamed, validated and committed under a deterministic
//! filename. Many identifiers are processed concurrently by a fixed pool of
//! workers.
//!
//! # Architecture
//!
//! - [`download`] - Retrieval pipeline, worker pool and run statistics
//! - [`parser`] - DOI extraction from Web of Science export archives
//! - [`batch`] - Sliced runs with cool-downs and anomaly aborts
//! - [`config`] - JSON configuration layer
//! - [`report`] - Terminal summaries and run log files

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod config;
pub mod download;
pub mod parser;
pub mod report;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use batch::{AbortReason, BatchPlan, BatchSummary, run_batches};
pub use config::{ConfigError, PipelineConfig};
pub use download::{
    DEFAULT_WORKERS, DownloadEngine, DownloadError, EngineError, FailureKind, HttpClient, Job,
    Outcome, OutcomeObserver, OutcomeStatus, Pacing, RetryPolicy, RunStatistics,
    TransportSettings,
};
pub use parser::{ArchiveCheck, ArchiveError, check_archive, extract_archive_dois};
pub use report::{RunLogger, render_check, render_summary};
