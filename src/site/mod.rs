//! Fetches the page that lists the annex links.

use std::time::Duration;

use reqwest::header::ACCEPT;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::download::HttpClient;
use crate::user_agent::HTML_ACCEPT;

/// Errors raised while fetching the source page.
#[derive(Debug, Error)]
pub enum SiteError {
    /// Network-level failure (DNS, connection refused, TLS).
    #[error("failed to reach {url}: {source}")]
    Network {
        /// The page URL.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The request timed out.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The page URL.
        url: String,
    },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The page URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The server answered 2xx with a blank body.
    #[error("empty page returned by {url}")]
    EmptyBody {
        /// The page URL.
        url: String,
    },
}

impl SiteError {
    fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// Downloads the HTML of `url`.
///
/// After a successful fetch the caller-supplied `politeness_delay` is slept
/// before returning, so the downloads that follow do not hit the server
/// back-to-back.
///
/// # Errors
///
/// Returns a [`SiteError`] for transport failures, non-2xx statuses, or a
/// whitespace-only body.
#[instrument(skip(client))]
pub async fn fetch_page(
    client: &HttpClient,
    url: &str,
    politeness_delay: Duration,
) -> Result<String, SiteError> {
    info!("fetching source page");

    let response = client
        .inner()
        .get(url)
        .header(ACCEPT, HTML_ACCEPT)
        .send()
        .await
        .map_err(|e| SiteError::from_reqwest(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SiteError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| SiteError::from_reqwest(url, e))?;

    if !politeness_delay.is_zero() {
        debug!(delay_ms = politeness_delay.as_millis(), "pausing after page fetch");
        tokio::time::sleep(politeness_delay).await;
    }

    if body.trim().is_empty() {
        return Err(SiteError::EmptyBody {
            url: url.to_string(),
        });
    }

    info!(status = status.as_u16(), bytes = body.len(), "source page fetched");
    Ok(body)
}
