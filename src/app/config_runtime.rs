use std::time::Duration;

use annex_sync_core::Settings;
use anyhow::{Context, Result};

use crate::app_config::FileConfig;
use crate::cli::Args;

/// Log level used when `RUST_LOG` is not set.
pub(crate) fn resolve_default_log_level(args: &Args) -> &'static str {
    if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

pub(crate) fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

/// Builds the effective settings: CLI flag, else config file, else default.
pub(crate) fn resolve_settings(args: &Args, file_config: Option<&FileConfig>) -> Result<Settings> {
    let file = file_config.cloned().unwrap_or_default();
    let mut settings = Settings::default();

    if let Some(base_url) = args.base_url.clone().or(file.base_url) {
        settings.base_url = base_url;
    }
    if let Some(secs) = args.timeout.or(file.timeout_secs) {
        settings.request_timeout = Duration::from_secs(secs);
    }
    if let Some(ms) = args.delay.or(file.delay_ms) {
        settings.inter_request_delay = Duration::from_millis(ms);
    }
    if let Some(max_parallel) = args.max_parallel.or(file.max_parallel) {
        settings.max_parallel = usize::from(max_parallel);
    }
    if let Some(max_attempts) = args.max_attempts.or(file.max_attempts) {
        settings.max_attempts = max_attempts;
    }
    if let Some(ms) = args.retry_delay.or(file.retry_delay_ms) {
        settings.retry_delay = Duration::from_millis(ms);
    }
    if let Some(overwrite) = args.overwrite_files.or(file.overwrite_files) {
        settings.overwrite_files = overwrite;
    }
    if let Some(clear) = args.clear_downloads.or(file.clear_downloads) {
        settings.clear_downloads = clear;
    }
    if let Some(parallel) = args.parallel.or(file.parallel) {
        settings.parallel = parallel;
    }
    if let Some(dir) = args.downloads_dir.clone().or(file.downloads_dir) {
        settings.downloads_dir = dir;
    }
    if let Some(subdir) = args.files_subdir.clone().or(file.files_subdir) {
        settings.files_subdir = subdir;
    }
    if let Some(format) = args.archive_format.or(file.archive_format) {
        settings.archive.format = format;
    }
    if let Some(name) = args.archive_name.clone().or(file.archive_name) {
        settings.archive.base_name = name;
    }
    if let Some(overwrite) = args.overwrite_archive.or(file.overwrite_archive) {
        settings.archive.overwrite = overwrite;
    }

    settings
        .validate()
        .context("Invalid effective configuration")?;
    Ok(settings)
}
