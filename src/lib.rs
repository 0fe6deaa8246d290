//! Annex Sync Core Library
//!
//! Keeps a local copy of the annexes published on the ANS procedure-list
//! update page: fetch the page, find the annex links, download them with
//! bounded-parallel retry, and pack them into one archive.
//!
//! # Architecture
//!
//! - [`site`] - Fetches the source page
//! - [`extract`] - Finds the annex links in the page HTML
//! - [`download`] - Download orchestrator with streaming, retry and skip-if-exists
//! - [`archive`] - Packs the downloaded files into zip/tar archives
//! - [`config`] - Effective run settings

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod config;
pub mod download;
pub mod extract;
pub mod site;
pub mod user_agent;

// Re-export commonly used types
pub use archive::{ArchiveError, ArchiveFormat, ArchiveOptions, create_archive};
pub use config::{ConfigError, Settings};
pub use download::{
    BatchReport, DownloadBatch, DownloadError, DownloadOptions, DownloadOrchestrator,
    DownloadOutcome, DownloadResult, DownloadStats, HttpClient, OrchestratorError, RetryPolicy,
    Transport,
};
pub use extract::{AnnexTarget, ExtractError, default_targets, extract_links};
pub use site::{SiteError, fetch_page};
