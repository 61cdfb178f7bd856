//! Shared HTTP transport for landing page and payload requests.
//!
//! One pooled `reqwest::Client` serves every worker. Page and payload
//! requests differ only in their per-request timeout and the payload's
//! `Referer`, so both request kinds reuse the same connections to the mirror.

use std::time::Duration;

use reqwest::header::REFERER;
use reqwest::{Client, RequestBuilder};
use tracing::{debug, instrument};

use super::constants::{
    CONNECT_TIMEOUT_SECS, PAGE_TIMEOUT_SECS, PAYLOAD_TIMEOUT_SECS, POOL_IDLE_TIMEOUT,
};
use super::headers::browser_headers;

/// Timeout and pool configuration for [`HttpClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout for landing pages.
    pub page_timeout: Duration,
    /// Whole-request timeout for payloads.
    pub payload_timeout: Duration,
    /// Idle connections kept per host; scale with the worker count.
    pub pool_size: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            page_timeout: Duration::from_secs(PAGE_TIMEOUT_SECS),
            payload_timeout: Duration::from_secs(PAYLOAD_TIMEOUT_SECS),
            pool_size: 2,
        }
    }
}

impl TransportSettings {
    /// Default timeouts with a pool sized for `workers` concurrent jobs.
    #[must_use]
    pub fn for_workers(workers: usize) -> Self {
        Self {
            pool_size: workers.max(1),
            ..Self::default()
        }
    }
}

/// HTTP client pair for the retrieval pipeline.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    page_timeout: Duration,
    payload_timeout: Duration,
}

impl HttpClient {
    /// Builds the shared client with the browser header profile and gzip decoding.
    ///
    /// # Errors
    ///
    /// Returns the builder error if TLS or proxy initialization fails.
    #[instrument(level = "debug")]
    pub fn new(settings: &TransportSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .default_headers(browser_headers())
            .connect_timeout(settings.connect_timeout)
            .pool_max_idle_per_host(settings.pool_size)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .gzip(true)
            .build()?;

        debug!(
            pool_size = settings.pool_size,
            page_timeout_ms = settings.page_timeout.as_millis(),
            payload_timeout_ms = settings.payload_timeout.as_millis(),
            "built shared HTTP client"
        );

        Ok(Self {
            client,
            page_timeout: settings.page_timeout,
            payload_timeout: settings.payload_timeout,
        })
    }

    /// Prepares a landing page request.
    pub(crate) fn page_request(&self, url: &str) -> RequestBuilder {
        self.client.get(url).timeout(self.page_timeout)
    }

    /// Prepares a payload request that names the landing page as referer.
    pub(crate) fn payload_request(&self, url: &str, referer: &str) -> RequestBuilder {
        self.client
            .get(url)
            .header(REFERER, referer)
            .timeout(self.payload_timeout)
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}
