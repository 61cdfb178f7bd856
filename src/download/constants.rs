//! Constants for the download module (timeouts, pacing, payload format).

use std::time::Duration;

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default landing page timeout (10 seconds, pages are small).
pub const PAGE_TIMEOUT_SECS: u64 = 10;

/// Default payload timeout (30 seconds for binary documents).
pub const PAYLOAD_TIMEOUT_SECS: u64 = 30;

/// How long idle pooled connections are kept open.
pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Pacing sleep before each landing page request, in milliseconds.
pub const PAGE_DELAY_MS: (u64, u64) = (500, 2000);

/// Pacing sleep before each payload request, in milliseconds.
pub const PAYLOAD_DELAY_MS: (u64, u64) = (300, 1000);

/// File extension appended to sanitized identifiers.
pub const PAYLOAD_EXTENSION: &str = "pdf";

/// MIME type of the retrieved documents.
pub const PAYLOAD_MIME: &str = "application/pdf";

/// Magic signature every valid payload starts with.
pub const PAYLOAD_MAGIC: &[u8] = b"%PDF";

/// Bytes inspected when a payload fails the magic check.
pub const SNIFF_LEN: usize = 512;

/// Subdirectory of the output directory holding raw markup of failed extractions.
pub const DEBUG_DIR: &str = "debug";

/// Maximum characters of a page title embedded in a failure reason.
pub const TITLE_PREVIEW_CHARS: usize = 50;
