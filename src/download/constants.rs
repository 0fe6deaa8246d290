//! Constants for the download module (timeouts, pool bounds, retry defaults).

use std::time::Duration;

/// Default per-request timeout (30 seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Write buffer size used when streaming bodies to disk.
pub const CHUNK_SIZE: usize = 8192;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default number of parallel downloads.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Default number of attempts per file (including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default flat wait between attempts of the same file.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Default wait between downloads in sequential mode.
pub const DEFAULT_INTER_REQUEST_DELAY: Duration = Duration::from_secs(1);

/// Suffix of the temporary file a download streams into before it is renamed.
pub const PARTIAL_SUFFIX: &str = ".part";
