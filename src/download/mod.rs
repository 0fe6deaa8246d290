//! Download orchestration: bounded-parallel fetch with retry into a directory.
//!
//! # Features
//!
//! - Streaming downloads written through a `.part` file and renamed on success
//! - Skip-if-exists, so repeated runs make no network calls
//! - Extension inference from `Content-Type` when the logical name has none
//! - Flat-delay retry per file; one failing file never blocks its siblings
//! - Worker pool bounded by `max_concurrency`, or strictly sequential mode
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use annex_sync_core::download::{DownloadBatch, DownloadOptions, DownloadOrchestrator, HttpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let batch: DownloadBatch = [("Anexo_I.pdf", "https://example.com/anexo_i.pdf")]
//!     .into_iter()
//!     .collect();
//! let orchestrator = DownloadOrchestrator::new(Arc::new(HttpClient::new()), DownloadOptions::default())?;
//! let report = orchestrator.download_all(&batch, Path::new("./downloads")).await?;
//! for path in report.paths() {
//!     println!("Downloaded: {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod engine;
mod error;
mod filename;
mod report;
mod request;
mod retry;

pub use client::{BodyStream, FetchedResponse, HttpClient, Transport};
pub use constants::{
    DEFAULT_CONCURRENCY, DEFAULT_INTER_REQUEST_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY,
    MAX_CONCURRENCY, MIN_CONCURRENCY, REQUEST_TIMEOUT_SECS,
};
pub use engine::{DownloadOptions, DownloadOrchestrator};
pub use error::{DownloadError, OrchestratorError};
pub use report::{BatchReport, DownloadOutcome, DownloadResult, DownloadStats};
pub use request::{DownloadBatch, DownloadRequest};
pub use retry::{RetryDecision, RetryPolicy};
