//! Effective run settings shared by the pipeline stages.
//!
//! The binary builds a [`Settings`] from defaults, the config file and CLI
//! flags (in that order of increasing priority) and hands it to the library.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::archive::{ArchiveFormat, ArchiveOptions};
use crate::download::{
    DEFAULT_CONCURRENCY, DEFAULT_INTER_REQUEST_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY,
    DownloadOptions, MAX_CONCURRENCY, MIN_CONCURRENCY, REQUEST_TIMEOUT_SECS, RetryPolicy,
};
use crate::extract::{AnnexTarget, default_targets};

/// Page listing the procedure-list annexes.
pub const DEFAULT_BASE_URL: &str = "https://www.gov.br/ans/pt-br/acesso-a-informacao/participacao-da-sociedade/atualizacao-do-rol-de-procedimentos";

/// Root folder for downloads and the archive.
pub const DEFAULT_DOWNLOADS_DIR: &str = "downloads";

/// Folder under the downloads root that receives the annex files.
pub const DEFAULT_FILES_SUBDIR: &str = "arquivos";

/// Upper bound for `max_attempts`.
pub const MAX_ATTEMPTS_LIMIT: u32 = 20;

/// Upper bound for the request timeout, in seconds.
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 3600;

/// Upper bound for either delay, in milliseconds.
pub const MAX_DELAY_MS: u64 = 600_000;

/// Invalid effective configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The base URL does not parse as an absolute URL.
    #[error("invalid base URL `{url}`: {source}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Parser error.
        #[source]
        source: url::ParseError,
    },

    /// A numeric option is outside its accepted range.
    #[error("invalid value for `{field}`: {value}. Expected range: {min}..={max}")]
    OutOfRange {
        /// Option name.
        field: &'static str,
        /// Rejected value.
        value: u64,
        /// Lowest accepted value.
        min: u64,
        /// Highest accepted value.
        max: u64,
    },

    /// A name option is empty or contains a path separator.
    #[error("invalid value for `{field}`: `{value}` must be a non-empty plain name")]
    InvalidName {
        /// Option name.
        field: &'static str,
        /// Rejected value.
        value: String,
    },

    /// No annex targets configured.
    #[error("no annex targets configured")]
    NoTargets,
}

impl ConfigError {
    fn out_of_range(field: &'static str, value: u64, min: u64, max: u64) -> Self {
        Self::OutOfRange {
            field,
            value,
            min,
            max,
        }
    }
}

/// Every knob of a run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Page holding the annex links.
    pub base_url: String,
    /// Per-request timeout for the page and every download.
    pub request_timeout: Duration,
    /// Pause after the page fetch and between sequential downloads.
    pub inter_request_delay: Duration,
    /// Worker pool size in parallel mode.
    pub max_parallel: usize,
    /// Attempts per file, first try included.
    pub max_attempts: u32,
    /// Pause between attempts of one file.
    pub retry_delay: Duration,
    /// Re-download files that already exist.
    pub overwrite_files: bool,
    /// Empty the files folder before downloading.
    pub clear_downloads: bool,
    /// Use the worker pool instead of one-at-a-time downloads.
    pub parallel: bool,
    /// Root folder for downloads and the archive.
    pub downloads_dir: PathBuf,
    /// Subfolder of `downloads_dir` receiving the files.
    pub files_subdir: PathBuf,
    /// Archive naming and format.
    pub archive: ArchiveOptions,
    /// Links to look for.
    pub targets: Vec<AnnexTarget>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            inter_request_delay: DEFAULT_INTER_REQUEST_DELAY,
            max_parallel: DEFAULT_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            overwrite_files: false,
            clear_downloads: false,
            parallel: true,
            downloads_dir: PathBuf::from(DEFAULT_DOWNLOADS_DIR),
            files_subdir: PathBuf::from(DEFAULT_FILES_SUBDIR),
            archive: ArchiveOptions {
                format: ArchiveFormat::Zip,
                base_name: "anexos".to_string(),
                overwrite: true,
            },
            targets: default_targets(),
        }
    }
}

impl Settings {
    /// Checks ranges and names.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.page_url()?;

        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.max_parallel) {
            return Err(ConfigError::out_of_range(
                "max_parallel",
                self.max_parallel as u64,
                MIN_CONCURRENCY as u64,
                MAX_CONCURRENCY as u64,
            ));
        }
        if !(1..=MAX_ATTEMPTS_LIMIT).contains(&self.max_attempts) {
            return Err(ConfigError::out_of_range(
                "max_attempts",
                u64::from(self.max_attempts),
                1,
                u64::from(MAX_ATTEMPTS_LIMIT),
            ));
        }

        let timeout = self.request_timeout.as_secs();
        if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&timeout) {
            return Err(ConfigError::out_of_range(
                "request_timeout",
                timeout,
                1,
                MAX_REQUEST_TIMEOUT_SECS,
            ));
        }
        check_delay("inter_request_delay", self.inter_request_delay)?;
        check_delay("retry_delay", self.retry_delay)?;

        check_plain_name("archive_name", &self.archive.base_name)?;
        check_plain_name("files_subdir", &self.files_subdir.to_string_lossy())?;

        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        Ok(())
    }

    /// Parsed [`base_url`](Self::base_url).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if the URL does not parse.
    pub fn page_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|source| ConfigError::InvalidUrl {
            url: self.base_url.clone(),
            source,
        })
    }

    /// Folder the annex files are downloaded into.
    #[must_use]
    pub fn files_dir(&self) -> PathBuf {
        self.downloads_dir.join(&self.files_subdir)
    }

    /// Orchestrator options derived from these settings.
    #[must_use]
    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            max_concurrency: self.max_parallel,
            retry: RetryPolicy::new(self.max_attempts, self.retry_delay),
            inter_request_delay: self.inter_request_delay,
            overwrite_existing: self.overwrite_files,
            parallel: self.parallel,
        }
    }
}

fn check_delay(field: &'static str, delay: Duration) -> Result<(), ConfigError> {
    let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if millis > MAX_DELAY_MS {
        return Err(ConfigError::out_of_range(field, millis, 0, MAX_DELAY_MS));
    }
    Ok(())
}

fn check_plain_name(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() || value.contains(['/', '\\']) || value == ".." {
        return Err(ConfigError::InvalidName {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
