//! Error types for the download module.
//!
//! [`DownloadError`] describes a single failed attempt and carries the URL or
//! path that caused it. [`OrchestratorError`] is the batch-level failure
//! surfaced by [`DownloadOrchestrator::download_all`](super::DownloadOrchestrator::download_all).

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while downloading a single file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, reset, TLS).
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-2xx HTTP response.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body stream broke off mid-transfer.
    #[error("body stream interrupted downloading {url}: {reason}")]
    Interrupted {
        /// The URL whose body failed.
        url: String,
        /// Human-readable cause.
        reason: String,
    },

    /// File system error during download (create file, write, rename).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Another request in the same batch already owns the destination path.
    #[error("destination {path} already claimed by `{owner}`")]
    DestinationClaimed {
        /// The contested destination path.
        path: PathBuf,
        /// Logical name of the request that claimed the path first.
        owner: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an interrupted-body error.
    pub fn interrupted(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Interrupted {
            url: url.into(),
            reason: reason.into(),
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

    /// Creates a destination-claimed error.
    pub fn destination_claimed(path: impl Into<PathBuf>, owner: impl Into<String>) -> Self {
        Self::DestinationClaimed {
            path: path.into(),
            owner: owner.into(),
        }
    }

    /// Returns true when the failure is local to the filesystem rather than the remote side.
    ///
    /// Filesystem failures abort the batch instead of being retried.
    #[must_use]
    pub fn is_filesystem(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Batch-level failures of the download orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Invalid concurrency value provided.
    #[error("invalid concurrency value {value}: must be between {min} and {max}")]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
        /// Lowest accepted value.
        min: usize,
        /// Highest accepted value.
        max: usize,
    },

    /// The destination directory could not be created.
    #[error("cannot create destination directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The destination directory exists but cannot be written to.
    #[error("destination directory {path} is not writable: {source}")]
    Unwritable {
        /// Directory that failed the write probe.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// One or more downloads hit a non-network failure; the batch stopped early.
    #[error("download batch aborted: {}", .causes.join("; "))]
    Aborted {
        /// One message per file that triggered the abort.
        causes: Vec<String>,
    },
}
