//! Error types for the retrieval pipeline.
//!
//! Every per-job failure is a [`DownloadError`]. Each variant maps onto a
//! [`FailureKind`] so callers can spot patterns across a batch (sustained
//! rate limiting, bot challenges) without parsing messages.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connection, DNS, TLS, timeout or body read failures.
    Transport,
    /// HTTP 403 on every attempt.
    RateLimited,
    /// HTTP 404 after the transient retry.
    MissingPage,
    /// Any other non-200 status.
    HttpStatus,
    /// The mirror explicitly reports the article as unavailable.
    Unavailable,
    /// The landing page is a captcha challenge.
    BotChallenge,
    /// No extraction strategy found a document link.
    Extraction,
    /// The payload response declared a textual content type.
    ContentType,
    /// The written payload is empty or fails the magic-byte check.
    Integrity,
    /// Staging or committing the payload on disk failed.
    Filesystem,
    /// The run was cancelled before the job finished.
    Cancelled,
    /// The job's target URL could not be parsed.
    InvalidInput,
}

impl FailureKind {
    /// Short human label used when grouping failures in reports.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Transport => "network or timeout error",
            Self::RateLimited => "HTTP 403 (rate limited)",
            Self::MissingPage => "page not found",
            Self::HttpStatus => "unexpected HTTP status",
            Self::Unavailable => "article not available on mirror",
            Self::BotChallenge => "captcha challenge",
            Self::Extraction => "no document link found",
            Self::ContentType => "HTML returned instead of PDF",
            Self::Integrity => "invalid PDF file",
            Self::Filesystem => "filesystem error",
            Self::Cancelled => "cancelled",
            Self::InvalidInput => "invalid target URL",
        }
    }

    /// Whether this failure hints that the mirror is pushing back on our traffic.
    #[must_use]
    pub fn is_anomaly(self) -> bool {
        matches!(self, Self::RateLimited | Self::BotChallenge)
    }
}

/// Which of the two requests of a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Landing page request.
    Page,
    /// Binary document request.
    Payload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Page => write!(f, "page"),
            Self::Payload => write!(f, "PDF"),
        }
    }
}

/// Refined reason when no strategy yields a document link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionFailure {
    /// Page says the article is not available.
    Unavailable,
    /// Page contains a captcha.
    BotChallenge,
    /// Page mentions "not found" or "404".
    MissingPage,
    /// Nothing recognizable; carries the truncated page title if any.
    Unrecognized {
        /// Truncated `<title>` text.
        title: Option<String>,
    },
}

impl ExtractionFailure {
    /// The failure kind for this refinement.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unavailable => FailureKind::Unavailable,
            Self::BotChallenge => FailureKind::BotChallenge,
            Self::MissingPage => FailureKind::MissingPage,
            Self::Unrecognized { .. } => FailureKind::Extraction,
        }
    }
}

impl fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "article is not available on the mirror"),
            Self::BotChallenge => write!(f, "could not extract PDF URL from page (captcha detected)"),
            Self::MissingPage => write!(f, "could not extract PDF URL from page (page not found)"),
            Self::Unrecognized { title: Some(title) } => {
                write!(f, "could not extract PDF URL from page (page title: {title})")
            }
            Self::Unrecognized { title: None } => write!(f, "could not extract PDF URL from page"),
        }
    }
}

/// What an HTML error page returned in place of a payload appears to say.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtmlHint {
    /// Mentions 403 or forbidden.
    Forbidden,
    /// Mentions 404 or not found.
    NotFound,
    /// Mentions a captcha.
    Captcha,
    /// Nothing more specific.
    Generic,
}

/// Why a written payload was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityFailure {
    /// Zero bytes were written.
    Empty,
    /// The body is an HTML document.
    HtmlErrorPage {
        /// Refined hint from the page content.
        hint: HtmlHint,
    },
    /// The body still starts with the gzip magic.
    StillCompressed,
    /// Anything else without the PDF signature.
    NotDocument,
}

impl fmt::Display for IntegrityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "downloaded file is empty"),
            Self::HtmlErrorPage { hint } => {
                let detail = match hint {
                    HtmlHint::Forbidden => "HTML 403 error page",
                    HtmlHint::NotFound => "HTML 404 error page",
                    HtmlHint::Captcha => "captcha page",
                    HtmlHint::Generic => "HTML error page instead of PDF",
                };
                write!(f, "downloaded file is not a valid PDF (server returned {detail})")
            }
            Self::StillCompressed => write!(
                f,
                "downloaded file is not a valid PDF (payload still gzip-compressed, likely mis-decoded)"
            ),
            Self::NotDocument => write!(f, "downloaded file is not a valid PDF"),
        }
    }
}

/// Errors that can occur while retrieving one document.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("{stage} request failed for {url}: {source} (after {attempts} attempts)")]
    Network {
        /// Request that failed.
        stage: Stage,
        /// The URL that failed.
        url: String,
        /// Attempts made before giving up.
        attempts: u32,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out on every attempt.
    #[error("{stage} request timeout for {url} (after {attempts} attempts)")]
    Timeout {
        /// Request that timed out.
        stage: Stage,
        /// The URL that timed out.
        url: String,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// HTTP 403 on every attempt.
    #[error("{stage} request failed: HTTP 403 for {url} (after {attempts} attempts)")]
    RateLimited {
        /// Request that was rejected.
        stage: Stage,
        /// The rejected URL.
        url: String,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// HTTP 404 after the transient retry.
    #[error("{stage} request failed: HTTP 404 for {url}, page does not exist (after {attempts} attempts)")]
    NotFound {
        /// Request that was not found.
        stage: Stage,
        /// The missing URL.
        url: String,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Non-retryable HTTP status.
    #[error("{stage} request failed: HTTP {status} for {url}")]
    HttpStatus {
        /// Request that failed.
        stage: Stage,
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Reading a response body failed after the status line arrived.
    #[error("failed reading {stage} body from {url}: {source}")]
    Body {
        /// Request whose body failed.
        stage: Stage,
        /// The URL being read.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// No extraction strategy yielded a document link.
    #[error("{failure}")]
    Extraction {
        /// Refined reason from the page content.
        failure: ExtractionFailure,
    },

    /// The payload response declared a textual content type.
    #[error("PDF download failed: server returned HTML instead of PDF (Content-Type: {content_type}) for {url}")]
    ContentType {
        /// The payload URL.
        url: String,
        /// The declared content type.
        content_type: String,
    },

    /// The written payload failed validation.
    #[error("{failure}")]
    Integrity {
        /// Why the payload was rejected.
        failure: IntegrityFailure,
    },

    /// File system error while staging or committing the payload.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The target URL is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The run was cancelled.
    #[error("cancelled before completion")]
    Cancelled,
}

impl DownloadError {
    /// Creates a network error, promoting timeouts to [`DownloadError::Timeout`].
    pub fn network(stage: Stage, url: impl Into<String>, attempts: u32, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                stage,
                url: url.into(),
                attempts,
            }
        } else {
            Self::Network {
                stage,
                url: url.into(),
                attempts,
                source,
            }
        }
    }

    /// Creates an HTTP 403 exhaustion error.
    pub fn rate_limited(stage: Stage, url: impl Into<String>, attempts: u32) -> Self {
        Self::RateLimited {
            stage,
            url: url.into(),
            attempts,
        }
    }

    /// Creates an HTTP 404 exhaustion error.
    pub fn not_found(stage: Stage, url: impl Into<String>, attempts: u32) -> Self {
        Self::NotFound {
            stage,
            url: url.into(),
            attempts,
        }
    }

    /// Creates a non-retryable HTTP status error.
    pub fn http_status(stage: Stage, url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            stage,
            url: url.into(),
            status,
        }
    }

    /// Creates a body read error.
    pub fn body(stage: Stage, url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Body {
            stage,
            url: url.into(),
            source,
        }
    }

    /// Creates a content type mismatch error.
    pub fn content_type(url: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::ContentType {
            url: url.into(),
            content_type: content_type.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Classifies this error for batch-level inspection.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network { .. } | Self::Timeout { .. } | Self::Body { .. } => FailureKind::Transport,
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::NotFound { .. } => FailureKind::MissingPage,
            Self::HttpStatus { .. } => FailureKind::HttpStatus,
            Self::Extraction { failure } => failure.kind(),
            Self::ContentType { .. } => FailureKind::ContentType,
            Self::Integrity { .. } => FailureKind::Integrity,
            Self::Io { .. } => FailureKind::Filesystem,
            Self::InvalidUrl { .. } => FailureKind::InvalidInput,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }
}

impl From<ExtractionFailure> for DownloadError {
    fn from(failure: ExtractionFailure) -> Self {
        Self::Extraction { failure }
    }
}

impl From<IntegrityFailure> for DownloadError {
    fn from(failure: IntegrityFailure) -> Self {
        Self::Integrity { failure }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_display_names_status_and_attempts() {
        let error = DownloadError::rate_limited(Stage::Page, "https://mirror.test/10.1/x", 3);
        let msg = error.to_string();
        assert!(msg.contains("HTTP 403"), "Expected status in: {msg}");
        assert!(msg.contains("3 attempts"), "Expected attempt count in: {msg}");
        assert!(msg.starts_with("page request"), "Expected stage in: {msg}");
        assert_eq!(error.kind(), FailureKind::RateLimited);
    }

    #[test]
    fn test_not_found_maps_to_missing_page() {
        let error = DownloadError::not_found(Stage::Page, "https://mirror.test/10.1/x", 2);
        assert!(error.to_string().contains("404"));
        assert_eq!(error.kind(), FailureKind::MissingPage);
    }

    #[test]
    fn test_http_status_display() {
        let error = DownloadError::http_status(Stage::Payload, "https://mirror.test/a.pdf", 500);
        let msg = error.to_string();
        assert!(msg.contains("HTTP 500"), "Expected status in: {msg}");
        assert!(msg.starts_with("PDF request"), "Expected stage in: {msg}");
        assert_eq!(error.kind(), FailureKind::HttpStatus);
    }

    #[test]
    fn test_extraction_failure_kinds() {
        assert_eq!(
            DownloadError::from(ExtractionFailure::Unavailable).kind(),
            FailureKind::Unavailable
        );
        assert_eq!(
            DownloadError::from(ExtractionFailure::BotChallenge).kind(),
            FailureKind::BotChallenge
        );
        assert_eq!(
            DownloadError::from(ExtractionFailure::MissingPage).kind(),
            FailureKind::MissingPage
        );
        assert_eq!(
            DownloadError::from(ExtractionFailure::Unrecognized { title: None }).kind(),
            FailureKind::Extraction
        );
    }

    #[test]
    fn test_unrecognized_extraction_embeds_title() {
        let failure = ExtractionFailure::Unrecognized {
            title: Some("Mirror home".to_string()),
        };
        assert!(failure.to_string().contains("page title: Mirror home"));
        let bare = ExtractionFailure::Unrecognized { title: None };
        assert!(!bare.to_string().contains("page title"));
    }

    #[test]
    fn test_integrity_html_hint_display() {
        let failure = IntegrityFailure::HtmlErrorPage {
            hint: HtmlHint::Generic,
        };
        assert!(failure.to_string().contains("HTML error page"));
        let error = DownloadError::from(IntegrityFailure::StillCompressed);
        assert!(error.to_string().contains("gzip"));
        assert_eq!(error.kind(), FailureKind::Integrity);
    }

    #[test]
    fn test_io_display_contains_path() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::io(PathBuf::from("/tmp/out.pdf"), io_error);
        assert!(error.to_string().contains("/tmp/out.pdf"));
        assert_eq!(error.kind(), FailureKind::Filesystem);
    }

    #[test]
    fn test_anomaly_kinds() {
        assert!(FailureKind::RateLimited.is_anomaly());
        assert!(FailureKind::BotChallenge.is_anomaly());
        assert!(!FailureKind::Transport.is_anomaly());
        assert!(!FailureKind::Integrity.is_anomaly());
    }

    #[test]
    fn test_failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::BotChallenge).unwrap();
        assert_eq!(json, "\"bot_challenge\"");
    }
}
