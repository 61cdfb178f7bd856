//! Concurrent DOI retrieval pipeline.
//!
//! For each [`Job`] a worker checks the output sink, fetches the mirror's
//! landing page, extracts the document link, then streams, validates and
//! atomically commits the payload. Outcomes feed one [`RunStatistics`].
//!
//! # Features
//!
//! - Idempotent skip when the deterministic output file already exists
//! - One pooled client with a browser header profile and gzip decoding
//! - Randomized anti-bot pacing and escalating retry backoff
//! - Ordered link extraction strategies with classified failures
//! - Temp-file staging with atomic rename; nothing partial is left behind
//! - Cooperative cancellation through a `CancellationToken`

mod client;
mod constants;
mod engine;
mod error;
pub mod extract;
mod headers;
mod page;
mod payload;
mod retry;
mod sink;
mod stats;

pub use client::{HttpClient, TransportSettings};
pub use constants::{PAYLOAD_EXTENSION, PAYLOAD_MAGIC};
pub use engine::{
    DEFAULT_WORKERS, DownloadEngine, EngineError, MAX_WORKERS, MIN_WORKERS, OutcomeObserver,
};
pub use error::{
    DownloadError, ExtractionFailure, FailureKind, HtmlHint, IntegrityFailure, Stage,
};
pub use extract::extract_document_url;
pub use headers::BROWSER_USER_AGENT;
pub use payload::{is_textual_content_type, validate_payload};
pub use retry::{DEFAULT_MAX_ATTEMPTS, Pacing, RetryDecision, RetryPolicy, RetryTrigger};
pub use sink::{OutputSink, output_filename, sanitize_identifier};
pub use stats::{FailureRecord, Job, Outcome, OutcomeStatus, RunStatistics};
