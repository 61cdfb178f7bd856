//! Payload retrieval, validation and atomic commit.
//!
//! The body is streamed into a staging file inside the output directory.
//! Only a validated staging file is renamed onto the final path, so the
//! skip check never sees a partial or invalid document. Dropping a
//! [`StagedPayload`] without committing it removes the staging file.

use std::path::Path;

use futures_util::StreamExt;
use reqwest::Response;
use reqwest::header::CONTENT_TYPE;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use super::client::HttpClient;
use super::constants::{PAYLOAD_MAGIC, SNIFF_LEN};
use super::error::{DownloadError, HtmlHint, IntegrityFailure, Stage};
use super::retry::{Pacing, RetryPolicy, pause, send_with_retry};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A validated payload waiting to be renamed into place.
#[derive(Debug)]
pub(crate) struct StagedPayload {
    file: NamedTempFile,
    bytes: u64,
}

impl StagedPayload {
    /// Bytes written to the staging file.
    pub(crate) fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Path of the staging file.
    #[cfg(test)]
    pub(crate) fn staging_path(&self) -> &Path {
        self.file.path()
    }

    /// Atomically renames the staging file onto `destination`.
    pub(crate) fn commit(self, destination: &Path) -> Result<u64, DownloadError> {
        self.file
            .persist(destination)
            .map_err(|e| DownloadError::io(destination, e.error))?;
        debug!(path = %destination.display(), bytes = self.bytes, "payload committed");
        Ok(self.bytes)
    }
}

/// Whether a declared content type means the mirror sent a page instead of a document.
#[must_use]
pub fn is_textual_content_type(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    !lower.is_empty()
        && !lower.contains("pdf")
        && !lower.contains("octet-stream")
        && (lower.contains("html") || lower.contains("text"))
}

/// Checks the leading bytes of a written payload.
///
/// `head` holds up to the first 512 bytes; `len` is the full size.
///
/// # Errors
///
/// Returns the refined [`IntegrityFailure`] when the bytes are not a PDF.
pub fn validate_payload(head: &[u8], len: u64) -> Result<(), IntegrityFailure> {
    if len == 0 {
        return Err(IntegrityFailure::Empty);
    }
    if head.starts_with(PAYLOAD_MAGIC) {
        return Ok(());
    }

    let lower = String::from_utf8_lossy(head).to_lowercase();
    if lower.contains("<html") || lower.contains("<!doctype") {
        let hint = if lower.contains("403") || lower.contains("forbidden") {
            HtmlHint::Forbidden
        } else if lower.contains("404") || lower.contains("not found") {
            HtmlHint::NotFound
        } else if lower.contains("captcha") {
            HtmlHint::Captcha
        } else {
            HtmlHint::Generic
        };
        return Err(IntegrityFailure::HtmlErrorPage { hint });
    }
    if head.starts_with(&GZIP_MAGIC) {
        return Err(IntegrityFailure::StillCompressed);
    }
    Err(IntegrityFailure::NotDocument)
}

/// Paces, downloads and validates the document at `url` into `staging_dir`.
#[instrument(level = "debug", skip(client, policy, pacing, cancel), fields(url = %url))]
pub(crate) async fn fetch_payload(
    client: &HttpClient,
    url: &Url,
    referer: &Url,
    staging_dir: &Path,
    policy: &RetryPolicy,
    pacing: &Pacing,
    cancel: &CancellationToken,
) -> Result<StagedPayload, DownloadError> {
    pause(pacing.payload_delay(), cancel).await?;

    let response = send_with_retry(Stage::Payload, url.as_str(), policy, cancel, || {
        client.payload_request(url.as_str(), referer.as_str())
    })
    .await?;

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if is_textual_content_type(&content_type) {
        return Err(DownloadError::content_type(url.as_str(), content_type));
    }

    let staged = stream_to_staging(response, url, staging_dir, cancel).await?;
    let head = read_head(staged.file.path()).await?;
    validate_payload(&head, staged.bytes)?;
    Ok(staged)
}

async fn stream_to_staging(
    response: Response,
    url: &Url,
    staging_dir: &Path,
    cancel: &CancellationToken,
) -> Result<StagedPayload, DownloadError> {
    let file = tempfile::Builder::new()
        .prefix(".doihive-")
        .suffix(".part")
        .tempfile_in(staging_dir)
        .map_err(|e| DownloadError::io(staging_dir, e))?;
    let handle = file
        .reopen()
        .map_err(|e| DownloadError::io(file.path(), e))?;
    let mut writer = BufWriter::new(tokio::fs::File::from_std(handle));

    let mut stream = response.bytes_stream();
    let mut bytes = 0u64;
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DownloadError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk.map_err(|e| DownloadError::body(Stage::Payload, url.as_str(), e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file.path(), e))?;
        bytes += chunk.len() as u64;
    }
    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file.path(), e))?;
    drop(writer);

    debug!(bytes, staging = %file.path().display(), "payload staged");
    Ok(StagedPayload { file, bytes })
}

async fn read_head(path: &Path) -> Result<Vec<u8>, DownloadError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    Ok(head)
}
