//! Landing page retrieval.

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use super::client::HttpClient;
use super::error::{DownloadError, Stage};
use super::retry::{Pacing, RetryPolicy, pause, send_with_retry};

/// A fetched landing page.
#[derive(Debug, Clone)]
pub(crate) struct LandingPage {
    /// Final URL after redirects; base for link resolution and the payload referer.
    pub(crate) url: Url,
    /// Decoded markup.
    pub(crate) markup: String,
}

/// Paces, fetches and decodes the landing page at `url`.
///
/// Gzip bodies are decoded by the transport before they reach this function.
#[instrument(level = "debug", skip(client, policy, pacing, cancel), fields(url = %url))]
pub(crate) async fn fetch_page(
    client: &HttpClient,
    url: &Url,
    policy: &RetryPolicy,
    pacing: &Pacing,
    cancel: &CancellationToken,
) -> Result<LandingPage, DownloadError> {
    pause(pacing.page_delay(), cancel).await?;

    let response = send_with_retry(Stage::Page, url.as_str(), policy, cancel, || {
        client.page_request(url.as_str())
    })
    .await?;

    let final_url = response.url().clone();
    let markup = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(DownloadError::Cancelled),
        text = response.text() => text.map_err(|e| DownloadError::body(Stage::Page, url.as_str(), e))?,
    };

    debug!(bytes = markup.len(), final_url = %final_url, "landing page received");
    Ok(LandingPage {
        url: final_url,
        markup,
    })
}
