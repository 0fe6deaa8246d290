//! Per-file results and batch statistics.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::DownloadRequest;

/// Terminal outcome of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Bytes were fetched and written to this path.
    Downloaded(PathBuf),
    /// A file was already present at the resolved path; nothing was written.
    AlreadyPresent(PathBuf),
    /// No file was produced.
    Failed {
        /// Last error seen for this request.
        reason: String,
    },
}

/// Result paired one-to-one with a [`DownloadRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    /// The request this result answers.
    pub request: DownloadRequest,
    /// What happened.
    pub outcome: DownloadOutcome,
    /// Network attempts made (0 when skipped before any request).
    pub attempts: u32,
}

impl DownloadResult {
    /// Final path on disk, or `None` when the request failed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.outcome {
            DownloadOutcome::Downloaded(path) | DownloadOutcome::AlreadyPresent(path) => {
                Some(path)
            }
            DownloadOutcome::Failed { .. } => None,
        }
    }

    /// Returns true if a file is available for this request.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.path().is_some()
    }
}

/// Counters for a download batch.
///
/// Uses atomic counters so concurrent workers can update a shared instance.
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Files downloaded during this batch.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Files that were already present and left untouched.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Files that ended without a result.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Retry attempts made across all files.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// Files processed (completed + skipped + failed).
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed() + self.skipped() + self.failed()
    }

    pub(crate) fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    /// Copies the current counter values into a fresh instance.
    pub(crate) fn snapshot(&self) -> Self {
        Self {
            completed: AtomicUsize::new(self.completed()),
            skipped: AtomicUsize::new(self.skipped()),
            failed: AtomicUsize::new(self.failed()),
            retried: AtomicUsize::new(self.retried()),
        }
    }
}

/// Everything a batch produced, in completion order.
#[derive(Debug)]
pub struct BatchReport {
    requested: usize,
    results: Vec<DownloadResult>,
    stats: DownloadStats,
}

impl BatchReport {
    pub(crate) fn new(requested: usize, results: Vec<DownloadResult>, stats: DownloadStats) -> Self {
        Self {
            requested,
            results,
            stats,
        }
    }

    /// Number of requests submitted.
    #[must_use]
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Per-request results in completion order.
    #[must_use]
    pub fn results(&self) -> &[DownloadResult] {
        &self.results
    }

    /// Paths of every request that has a file on disk.
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        self.results.iter().filter_map(DownloadResult::path).collect()
    }

    /// Number of requests with a file on disk.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// Returns true when every request produced a file.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.succeeded() == self.requested
    }

    /// Batch counters.
    #[must_use]
    pub fn stats(&self) -> &DownloadStats {
        &self.stats
    }
}
