//! The end-to-end run: page -> links -> downloads -> archive.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use annex_sync_core::{
    DownloadOrchestrator, DownloadOutcome, HttpClient, Settings, create_archive, extract_links,
    fetch_page,
};
use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::ProcessExit;
use crate::app::exit_handler;

/// Runs the whole pipeline with already-validated settings.
#[instrument(skip(settings), fields(page = %settings.base_url))]
pub(crate) async fn run_pipeline(settings: &Settings) -> Result<ProcessExit> {
    let page_url = settings.page_url()?;
    let client = HttpClient::try_with_timeout(settings.request_timeout)
        .context("Failed to build HTTP client")?;

    let html = fetch_page(&client, page_url.as_str(), settings.inter_request_delay)
        .await
        .context("Failed to fetch the annex page")?;

    let batch = extract_links(&html, &page_url, &settings.targets)?;
    if batch.is_empty() {
        bail!("No annex links found on {page_url}");
    }
    for target in &settings.targets {
        if !batch.contains_name(&target.name) {
            warn!(name = %target.name, "annex link not found on page");
        }
    }

    let files_dir = settings.files_dir();
    if settings.clear_downloads {
        clear_directory(&files_dir)?;
    }

    let orchestrator = DownloadOrchestrator::new(Arc::new(client), settings.download_options())?;
    let report = orchestrator
        .download_all(&batch, &files_dir)
        .await
        .context("Download batch failed")?;

    for result in report.results() {
        match &result.outcome {
            DownloadOutcome::Downloaded(path) => {
                info!(
                    name = result.request.name(),
                    path = %path.display(),
                    attempts = result.attempts,
                    "downloaded"
                );
            }
            DownloadOutcome::AlreadyPresent(path) => {
                info!(name = result.request.name(), path = %path.display(), "already present");
            }
            DownloadOutcome::Failed { reason } => {
                warn!(
                    name = result.request.name(),
                    url = result.request.url(),
                    attempts = result.attempts,
                    %reason,
                    "download failed"
                );
            }
        }
    }

    let obtained = report.succeeded();
    let missing = settings.targets.len().saturating_sub(obtained);
    if obtained == 0 {
        warn!("no files obtained; skipping archive");
        return Ok(exit_handler::determine_exit_outcome(obtained, missing));
    }

    let source = files_dir.clone();
    let dest = settings.downloads_dir.clone();
    let options = settings.archive.clone();
    let archive = tokio::task::spawn_blocking(move || create_archive(&source, &dest, &options))
        .await
        .context("Archive task panicked")?
        .context("Failed to create archive")?;

    match archive {
        Some(path) => info!(path = %path.display(), "archive ready"),
        None => warn!(dir = %files_dir.display(), "nothing to archive"),
    }

    info!(obtained, missing, "annex sync finished");
    Ok(exit_handler::determine_exit_outcome(obtained, missing))
}

/// Removes everything inside `dir`, keeping the directory itself.
fn clear_directory(dir: &Path) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read '{}'", dir.display()));
        }
    };

    let mut removed = 0usize;
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to read '{}'", dir.display()))?
            .path();
        let removal = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removal.with_context(|| format!("Failed to remove '{}'", path.display()))?;
        removed += 1;
    }
    debug!(dir = %dir.display(), removed, "cleared downloads folder");
    Ok(())
}
