//! HTTP transport used by the download orchestrator.
//!
//! [`Transport`] is the seam between the orchestrator and the network: the
//! production implementation is [`HttpClient`] (reqwest, streaming bodies),
//! tests substitute instrumented in-memory transports.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::{debug, instrument};
use url::Url;

use super::constants::REQUEST_TIMEOUT_SECS;
use super::error::DownloadError;
use crate::user_agent::{self, DOWNLOAD_ACCEPT};

/// Chunked response body.
pub type BodyStream = BoxStream<'static, Result<Bytes, DownloadError>>;

/// A successful (2xx) response whose body has not been read yet.
pub struct FetchedResponse {
    /// Declared `Content-Type`, if any.
    pub content_type: Option<String>,
    /// Response body as a stream of chunks.
    pub body: BodyStream,
}

impl std::fmt::Debug for FetchedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedResponse")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Issues a single GET and hands back the streaming response.
///
/// Implementations must map non-2xx statuses to [`DownloadError::HttpStatus`]
/// so the orchestrator only ever sees successful responses.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Starts a GET request for `url`.
    async fn get(&self, url: &str) -> Result<FetchedResponse, DownloadError>;
}

/// HTTP client for downloading files with streaming support.
///
/// Created once and shared across workers for connection pooling. Every
/// request carries browser-like headers and a fixed timeout.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the default 30 second request timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    /// This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    /// Creates a client with an explicit per-request timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the supplied configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::try_with_timeout(timeout)
            .expect("failed to build HTTP client with static configuration")
    }

    /// Fallible variant of [`with_timeout`](Self::with_timeout).
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error (e.g. TLS backend initialisation).
    pub fn try_with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .gzip(true)
            .default_headers(user_agent::browser_headers())
            .build()?;
        Ok(Self { client })
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpClient {
    #[instrument(skip(self), fields(url = %url))]
    async fn get(&self, url: &str) -> Result<FetchedResponse, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self
            .client
            .get(url)
            .header(ACCEPT, DOWNLOAD_ACCEPT)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        debug!(status = status.as_u16(), content_type = ?content_type, "response received");

        let owned_url = url.to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| map_reqwest_error(&owned_url, e)))
            .boxed();

        Ok(FetchedResponse { content_type, body })
    }
}

fn map_reqwest_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}
