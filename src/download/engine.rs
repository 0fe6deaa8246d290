//! Download orchestrator: bounded-parallel fetch with retry.
//!
//! The orchestrator turns a [`DownloadBatch`] into files under a destination
//! directory. Each request is retried with a flat delay, skipped when its file
//! already exists, and named after the `Content-Type` when the logical name
//! has no extension.
//!
//! # Concurrency Model
//!
//! - Parallel mode spawns `min(max_concurrency, batch.len())` worker tasks
//! - Workers pull requests from a bounded job queue and push reports into a
//!   fan-in channel, so results arrive in completion order
//! - A panicking job is caught inside its worker; the worker keeps running
//! - Sequential mode runs requests in insertion order with a pause between them
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use annex_sync_core::download::{DownloadBatch, DownloadOptions, DownloadOrchestrator, HttpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut batch = DownloadBatch::new();
//! batch.insert("Anexo_I.pdf", "https://example.com/anexo_i.pdf");
//!
//! let orchestrator = DownloadOrchestrator::new(Arc::new(HttpClient::new()), DownloadOptions::default())?;
//! let report = orchestrator.download_all(&batch, Path::new("./downloads/arquivos")).await?;
//! println!("{} of {} files available", report.succeeded(), report.requested());
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::{FutureExt, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, instrument, warn};

use super::client::{BodyStream, Transport};
use super::constants::{
    CHUNK_SIZE, DEFAULT_CONCURRENCY, DEFAULT_INTER_REQUEST_DELAY, MAX_CONCURRENCY,
    MIN_CONCURRENCY,
};
use super::filename::{destination_path, extension_for_content_type, has_extension, partial_path};
use super::report::{BatchReport, DownloadOutcome, DownloadResult, DownloadStats};
use super::retry::{RetryDecision, RetryPolicy};
use super::{DownloadBatch, DownloadError, DownloadRequest, OrchestratorError};

/// Name of the throwaway file used to check that the destination is writable.
const WRITE_PROBE_NAME: &str = ".annex-sync-write-probe";

/// Options controlling one orchestrator.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Upper bound on simultaneous downloads (1-100).
    pub max_concurrency: usize,
    /// Attempt budget and delay between attempts.
    pub retry: RetryPolicy,
    /// Pause between successive downloads in sequential mode.
    pub inter_request_delay: Duration,
    /// Re-download files that already exist at their destination.
    pub overwrite_existing: bool,
    /// Use the worker pool instead of one-at-a-time execution.
    pub parallel: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            inter_request_delay: DEFAULT_INTER_REQUEST_DELAY,
            overwrite_existing: false,
            parallel: true,
        }
    }
}

/// Downloads a batch of named URLs into a directory.
pub struct DownloadOrchestrator {
    transport: Arc<dyn Transport>,
    options: DownloadOptions,
}

impl std::fmt::Debug for DownloadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOrchestrator")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl DownloadOrchestrator {
    /// Creates an orchestrator over `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidConcurrency`] if `max_concurrency`
    /// is outside 1-100.
    pub fn new(
        transport: Arc<dyn Transport>,
        options: DownloadOptions,
    ) -> Result<Self, OrchestratorError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&options.max_concurrency) {
            return Err(OrchestratorError::InvalidConcurrency {
                value: options.max_concurrency,
                min: MIN_CONCURRENCY,
                max: MAX_CONCURRENCY,
            });
        }

        debug!(
            max_concurrency = options.max_concurrency,
            max_attempts = options.retry.max_attempts(),
            retry_delay_ms = options.retry.delay().as_millis(),
            parallel = options.parallel,
            overwrite = options.overwrite_existing,
            "creating download orchestrator"
        );

        Ok(Self { transport, options })
    }

    /// Returns the configured options.
    #[must_use]
    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Downloads every request in `batch` into `destination_dir`.
    ///
    /// The directory is resolved to an absolute path first, so every path in
    /// the report is absolute even when `destination_dir` is relative.
    ///
    /// Individual download failures do NOT cause this method to error: they
    /// appear as [`DownloadOutcome::Failed`] in the report, and
    /// [`BatchReport::is_complete`] tells the caller whether anything is missing.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::CreateDir`] / [`OrchestratorError::Unwritable`]
    ///   if the destination cannot be prepared (checked before any request).
    /// - [`OrchestratorError::Aborted`] if a download hit a filesystem failure
    ///   or panicked. Queued requests are not started once this happens.
    #[instrument(skip(self, batch), fields(dest = %destination_dir.display(), files = batch.len()))]
    pub async fn download_all(
        &self,
        batch: &DownloadBatch,
        destination_dir: &Path,
    ) -> Result<BatchReport, OrchestratorError> {
        let destination_dir = prepare_destination(destination_dir).await?;

        info!(files = batch.len(), parallel = self.options.parallel, "starting downloads");

        let ctx = Arc::new(TaskContext {
            transport: Arc::clone(&self.transport),
            options: self.options.clone(),
            destination_dir,
            claims: DashMap::new(),
            stats: DownloadStats::new(),
            aborted: AtomicBool::new(false),
        });

        let reports = if batch.is_empty() {
            Vec::new()
        } else if self.options.parallel {
            run_pool(Arc::clone(&ctx), batch).await
        } else {
            run_sequential(&ctx, batch).await
        };

        let mut results = Vec::with_capacity(reports.len());
        let mut causes = Vec::new();
        for report in reports {
            if let Some(cause) = report.fatal {
                causes.push(cause);
            }
            if let Some(result) = report.result {
                results.push(result);
            }
        }

        if !causes.is_empty() {
            error!(causes = causes.len(), "download batch aborted");
            return Err(OrchestratorError::Aborted { causes });
        }

        let stats = match Arc::try_unwrap(ctx) {
            Ok(ctx) => ctx.stats,
            Err(shared) => shared.stats.snapshot(),
        };

        info!(
            requested = batch.len(),
            completed = stats.completed(),
            skipped = stats.skipped(),
            failed = stats.failed(),
            retried = stats.retried(),
            "downloads finished"
        );

        Ok(BatchReport::new(batch.len(), results, stats))
    }
}

/// Read-only state shared by every task of one batch, plus the claim registry.
struct TaskContext {
    transport: Arc<dyn Transport>,
    options: DownloadOptions,
    destination_dir: PathBuf,
    /// Destination path -> logical name of the request that owns it.
    claims: DashMap<PathBuf, String>,
    stats: DownloadStats,
    aborted: AtomicBool,
}

impl TaskContext {
    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    /// Records `owner` as the only writer of `path` for this batch.
    fn claim(&self, path: &Path, owner: &str) -> Result<(), DownloadError> {
        match self.claims.entry(path.to_path_buf()) {
            Entry::Occupied(entry) if entry.get() != owner => {
                Err(DownloadError::destination_claimed(path, entry.get().clone()))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(entry) => {
                entry.insert(owner.to_string());
                Ok(())
            }
        }
    }
}

/// What a task hands back: a result (absent when the task never ran) and an
/// abort cause for defect-level failures.
struct TaskReport {
    result: Option<DownloadResult>,
    fatal: Option<String>,
}

/// Mutable per-request state while a download is in flight.
struct Target<'a> {
    request: &'a DownloadRequest,
    name: String,
    path: PathBuf,
    attempts: u32,
}

impl<'a> Target<'a> {
    fn new(request: &'a DownloadRequest, dir: &Path) -> Self {
        Self {
            request,
            name: request.name().to_string(),
            path: destination_path(dir, request.name()),
            attempts: 0,
        }
    }

    fn finish(&self, outcome: DownloadOutcome) -> DownloadResult {
        DownloadResult {
            request: self.request.clone(),
            outcome,
            attempts: self.attempts,
        }
    }
}

/// Result of one successful attempt.
enum AttemptOutcome {
    Written { path: PathBuf, bytes: u64 },
    AlreadyPresent(PathBuf),
}

async fn run_pool(ctx: Arc<TaskContext>, batch: &DownloadBatch) -> Vec<TaskReport> {
    let workers = ctx.options.max_concurrency.min(batch.len());
    debug!(workers, "starting worker pool");

    let (job_tx, job_rx) = mpsc::channel::<DownloadRequest>(workers);
    let job_rx = Arc::new(Mutex::new(job_rx));
    let (report_tx, mut report_rx) = mpsc::unbounded_channel::<TaskReport>();

    let handles: Vec<_> = (0..workers)
        .map(|worker_id| {
            tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&ctx),
                Arc::clone(&job_rx),
                report_tx.clone(),
            ))
        })
        .collect();
    drop(report_tx);

    // Reports go to an unbounded channel, so workers never block on it and
    // feeding the bounded job queue here cannot deadlock.
    for request in batch {
        if ctx.is_aborted() {
            debug!("batch aborted, not queueing remaining requests");
            break;
        }
        if job_tx.send(request.clone()).await.is_err() {
            break;
        }
    }
    drop(job_tx);

    let mut reports = Vec::with_capacity(batch.len());
    while let Some(report) = report_rx.recv().await {
        reports.push(report);
    }

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "download worker terminated abnormally");
            reports.push(TaskReport {
                result: None,
                fatal: Some(format!("download worker terminated: {e}")),
            });
        }
    }

    reports
}

async fn worker_loop(
    worker_id: usize,
    ctx: Arc<TaskContext>,
    jobs: Arc<Mutex<mpsc::Receiver<DownloadRequest>>>,
    reports: mpsc::UnboundedSender<TaskReport>,
) {
    loop {
        let next = jobs.lock().await.recv().await;
        let Some(request) = next else {
            break;
        };

        if ctx.is_aborted() {
            debug!(worker_id, name = request.name(), "batch aborted, skipping queued request");
            continue;
        }

        let report = run_guarded(&ctx, request).await;
        if reports.send(report).is_err() {
            break;
        }
    }
    debug!(worker_id, "worker finished");
}

async fn run_sequential(ctx: &TaskContext, batch: &DownloadBatch) -> Vec<TaskReport> {
    let mut reports = Vec::with_capacity(batch.len());
    let delay = ctx.options.inter_request_delay;

    for (index, request) in batch.iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            debug!(delay_ms = delay.as_millis(), "waiting before next download");
            tokio::time::sleep(delay).await;
        }
        if ctx.is_aborted() {
            debug!("batch aborted, not starting remaining requests");
            break;
        }
        reports.push(run_guarded(ctx, request.clone()).await);
    }

    reports
}

/// Runs one download, converting a panic into an absent result plus an abort cause.
async fn run_guarded(ctx: &TaskContext, request: DownloadRequest) -> TaskReport {
    match AssertUnwindSafe(download_one(ctx, &request))
        .catch_unwind()
        .await
    {
        Ok(report) => report,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(name = request.name(), panic = %message, "download task panicked");
            ctx.abort();
            ctx.stats.increment_failed();
            TaskReport {
                result: Some(DownloadResult {
                    request: request.clone(),
                    outcome: DownloadOutcome::Failed {
                        reason: format!("task panicked: {message}"),
                    },
                    attempts: 0,
                }),
                fatal: Some(format!("{}: task panicked: {message}", request.name())),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Downloads one request to its terminal outcome.
#[instrument(skip(ctx, request), fields(name = request.name(), url = request.url()))]
async fn download_one(ctx: &TaskContext, request: &DownloadRequest) -> TaskReport {
    let mut target = Target::new(request, &ctx.destination_dir);
    let overwrite = ctx.options.overwrite_existing;

    if let Err(e) = ctx.claim(&target.path, request.name()) {
        warn!(error = %e, "destination collision, request dropped");
        ctx.stats.increment_failed();
        return TaskReport {
            result: Some(target.finish(DownloadOutcome::Failed {
                reason: e.to_string(),
            })),
            fatal: None,
        };
    }

    if !overwrite && path_exists(&target.path).await {
        info!(path = %target.path.display(), "file already present, skipping download");
        ctx.stats.increment_skipped();
        let path = target.path.clone();
        return TaskReport {
            result: Some(target.finish(DownloadOutcome::AlreadyPresent(path))),
            fatal: None,
        };
    }

    let policy = &ctx.options.retry;
    loop {
        target.attempts += 1;
        debug!(attempt = target.attempts, "attempting download");

        let error = match attempt_once(ctx, &mut target).await {
            Ok(AttemptOutcome::Written { path, bytes }) => {
                info!(path = %path.display(), bytes, attempts = target.attempts, "download completed");
                ctx.stats.increment_completed();
                return TaskReport {
                    result: Some(target.finish(DownloadOutcome::Downloaded(path))),
                    fatal: None,
                };
            }
            Ok(AttemptOutcome::AlreadyPresent(path)) => {
                info!(path = %path.display(), "file already present under inferred name, skipping");
                ctx.stats.increment_skipped();
                return TaskReport {
                    result: Some(target.finish(DownloadOutcome::AlreadyPresent(path))),
                    fatal: None,
                };
            }
            Err(e) => e,
        };

        match policy.should_retry(&error, target.attempts) {
            RetryDecision::Retry { delay, attempt } => {
                info!(
                    attempt,
                    max_attempts = policy.max_attempts(),
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "retrying download"
                );
                ctx.stats.increment_retried();
                tokio::time::sleep(delay).await;
            }
            RetryDecision::DoNotRetry { reason } => {
                ctx.stats.increment_failed();
                let fatal = if error.is_filesystem() {
                    error!(error = %error, "filesystem failure, aborting batch");
                    ctx.abort();
                    Some(format!("{}: {error}", request.name()))
                } else {
                    warn!(error = %error, attempts = target.attempts, %reason, "download failed");
                    None
                };
                return TaskReport {
                    result: Some(target.finish(DownloadOutcome::Failed {
                        reason: error.to_string(),
                    })),
                    fatal,
                };
            }
        }
    }
}

/// One GET plus body write. Updates the target name when an extension is inferred.
async fn attempt_once(
    ctx: &TaskContext,
    target: &mut Target<'_>,
) -> Result<AttemptOutcome, DownloadError> {
    let response = ctx.transport.get(target.request.url()).await?;

    if !has_extension(&target.name)
        && let Some(extension) = response
            .content_type
            .as_deref()
            .and_then(extension_for_content_type)
    {
        target.name = format!("{}{extension}", target.name);
        target.path = destination_path(&ctx.destination_dir, &target.name);
        info!(name = %target.name, "file name updated from content type");

        ctx.claim(&target.path, target.request.name())?;
        if !ctx.options.overwrite_existing && path_exists(&target.path).await {
            // Dropping the response here releases the connection unread.
            return Ok(AttemptOutcome::AlreadyPresent(target.path.clone()));
        }
    }

    let bytes = write_body(response.body, &target.path).await?;
    Ok(AttemptOutcome::Written {
        path: target.path.clone(),
        bytes,
    })
}

/// Streams `body` into a `.part` sibling of `destination`, then renames it into place.
///
/// On any error the partial file is removed, so `destination` only ever holds
/// a complete body.
async fn write_body(body: BodyStream, destination: &Path) -> Result<u64, DownloadError> {
    let partial = partial_path(destination);
    let result = stream_to_file(body, &partial).await;

    match result {
        Ok(bytes) => {
            tokio::fs::rename(&partial, destination)
                .await
                .map_err(|e| DownloadError::io(destination, e))?;
            Ok(bytes)
        }
        Err(e) => {
            debug!(path = %partial.display(), "cleaning up partial file after error");
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                debug!(path = %partial.display(), error = %cleanup, "failed to remove partial file");
            }
            Err(e)
        }
    }
}

async fn stream_to_file(mut body: BodyStream, path: &Path) -> Result<u64, DownloadError> {
    let file = File::create(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    writer
        .into_inner()
        .sync_all()
        .await
        .map_err(|e| DownloadError::io(path, e))?;

    Ok(bytes_written)
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Creates `dir` if needed, checks that files can be created in it, and
/// returns its canonical absolute path.
async fn prepare_destination(dir: &Path) -> Result<PathBuf, OrchestratorError> {
    let create_dir_err = |source| OrchestratorError::CreateDir {
        path: dir.to_path_buf(),
        source,
    };
    tokio::fs::create_dir_all(dir).await.map_err(create_dir_err)?;
    let dir = tokio::fs::canonicalize(dir).await.map_err(create_dir_err)?;

    let probe = dir.join(WRITE_PROBE_NAME);
    File::create(&probe)
        .await
        .map_err(|source| OrchestratorError::Unwritable {
            path: dir.clone(),
            source,
        })?;
    if let Err(e) = tokio::fs::remove_file(&probe).await {
        debug!(path = %probe.display(), error = %e, "failed to remove write check file");
    }
    Ok(dir)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::stream;
    use tempfile::TempDir;

    use super::super::client::FetchedResponse;
    use super::*;

    /// Serves the same body for every URL and counts requests.
    struct StaticTransport {
        content_type: Option<&'static str>,
        body: &'static [u8],
        calls: std::sync::atomic::AtomicUsize,
    }

    impl StaticTransport {
        fn new(content_type: Option<&'static str>, body: &'static [u8]) -> Self {
            Self {
                content_type,
                body,
                calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for StaticTransport {
        async fn get(&self, _url: &str) -> Result<FetchedResponse, DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let chunks = vec![
                Ok(Bytes::from_static(self.body)),
                Ok(Bytes::new()),
            ];
            Ok(FetchedResponse {
                content_type: self.content_type.map(str::to_string),
                body: stream::iter(chunks).boxed(),
            })
        }
    }

    /// Panics for one URL, serves a body for the rest.
    struct PanickyTransport;

    #[async_trait]
    impl Transport for PanickyTransport {
        async fn get(&self, url: &str) -> Result<FetchedResponse, DownloadError> {
            assert!(!url.ends_with("/boom"), "transport exploded");
            Ok(FetchedResponse {
                content_type: None,
                body: stream::iter(vec![Ok(Bytes::from_static(b"ok"))]).boxed(),
            })
        }
    }

    /// Body that breaks off after the first chunk.
    struct TruncatingTransport;

    #[async_trait]
    impl Transport for TruncatingTransport {
        async fn get(&self, url: &str) -> Result<FetchedResponse, DownloadError> {
            let chunks = vec![
                Ok(Bytes::from_static(b"first half")),
                Err(DownloadError::interrupted(url, "connection reset")),
            ];
            Ok(FetchedResponse {
                content_type: None,
                body: stream::iter(chunks).boxed(),
            })
        }
    }

    fn options(parallel: bool) -> DownloadOptions {
        DownloadOptions {
            max_concurrency: 2,
            retry: RetryPolicy::new(2, Duration::ZERO),
            inter_request_delay: Duration::ZERO,
            overwrite_existing: false,
            parallel,
        }
    }

    fn orchestrator(transport: Arc<dyn Transport>, parallel: bool) -> DownloadOrchestrator {
        DownloadOrchestrator::new(transport, options(parallel)).unwrap()
    }

    #[test]
    fn test_new_rejects_zero_concurrency() {
        let opts = DownloadOptions {
            max_concurrency: 0,
            ..DownloadOptions::default()
        };
        let result = DownloadOrchestrator::new(Arc::new(StaticTransport::new(None, b"")), opts);
        assert!(matches!(
            result,
            Err(OrchestratorError::InvalidConcurrency { value: 0, .. })
        ));
    }

    #[test]
    fn test_new_rejects_too_high_concurrency() {
        let opts = DownloadOptions {
            max_concurrency: 101,
            ..DownloadOptions::default()
        };
        let result = DownloadOrchestrator::new(Arc::new(StaticTransport::new(None, b"")), opts);
        assert!(matches!(
            result,
            Err(OrchestratorError::InvalidConcurrency { value: 101, .. })
        ));
    }

    #[test]
    fn test_default_options() {
        let opts = DownloadOptions::default();
        assert_eq!(opts.max_concurrency, 2);
        assert_eq!(opts.retry.max_attempts(), 3);
        assert!(opts.parallel);
        assert!(!opts.overwrite_existing);
    }

    #[tokio::test]
    async fn test_empty_batch_creates_directory_and_returns_empty_report() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("nested").join("arquivos");
        let engine = orchestrator(Arc::new(StaticTransport::new(None, b"")), true);

        let report = engine.download_all(&DownloadBatch::new(), &dest).await.unwrap();

        assert!(dest.is_dir());
        assert_eq!(report.requested(), 0);
        assert!(report.is_complete());
        assert!(!dest.join(WRITE_PROBE_NAME).exists());
    }

    #[tokio::test]
    async fn test_empty_chunks_are_skipped_and_content_written() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(StaticTransport::new(None, b"%PDF-1.4 body"));
        let engine = orchestrator(transport, false);
        let batch: DownloadBatch = [("Anexo_I.pdf", "http://x/a")].into_iter().collect();

        let report = engine.download_all(&batch, temp.path()).await.unwrap();

        let path = report.paths()[0].to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4 body");
        assert!(!partial_path(&path).exists());
    }

    #[tokio::test]
    async fn test_collision_after_inference_rejects_second_request() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(StaticTransport::new(Some("application/pdf"), b"pdf"));
        let engine = orchestrator(transport, false);
        let batch: DownloadBatch = [("Anexo", "http://x/a"), ("Anexo.pdf", "http://x/b")]
            .into_iter()
            .collect();

        let report = engine.download_all(&batch, temp.path()).await.unwrap();

        assert_eq!(report.succeeded(), 1);
        let failed = report
            .results()
            .iter()
            .find(|r| !r.is_success())
            .unwrap();
        assert_eq!(failed.request.name(), "Anexo.pdf");
        assert!(matches!(
            &failed.outcome,
            DownloadOutcome::Failed { reason } if reason.contains("already claimed")
        ));
    }

    #[tokio::test]
    async fn test_interrupted_body_leaves_no_file_behind() {
        let temp = TempDir::new().unwrap();
        let engine = orchestrator(Arc::new(TruncatingTransport), false);
        let batch: DownloadBatch = [("Anexo_I.pdf", "http://x/a")].into_iter().collect();

        let report = engine.download_all(&batch, temp.path()).await.unwrap();

        assert_eq!(report.succeeded(), 0);
        assert_eq!(report.results()[0].attempts, 2);
        assert!(!temp.path().join("Anexo_I.pdf").exists());
        assert!(!temp.path().join("Anexo_I.pdf.part").exists());
    }

    #[tokio::test]
    async fn test_panicking_task_aborts_batch_but_worker_survives() {
        let temp = TempDir::new().unwrap();
        let engine = orchestrator(Arc::new(PanickyTransport), true);
        let batch: DownloadBatch = [("boom.pdf", "http://x/boom"), ("ok.pdf", "http://x/ok")]
            .into_iter()
            .collect();

        let result = engine.download_all(&batch, temp.path()).await;

        match result {
            Err(OrchestratorError::Aborted { causes }) => {
                assert_eq!(causes.len(), 1);
                assert!(causes[0].contains("boom.pdf"));
                assert!(causes[0].contains("transport exploded"));
            }
            other => panic!("expected aborted batch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unwritable_destination_fails_before_any_request() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let transport = Arc::new(StaticTransport::new(None, b"x"));
        let engine = orchestrator(Arc::clone(&transport) as Arc<dyn Transport>, true);
        let batch: DownloadBatch = [("a.pdf", "http://x/a")].into_iter().collect();

        let result = engine.download_all(&batch, &blocker.join("arquivos")).await;

        assert!(matches!(result, Err(OrchestratorError::CreateDir { .. })));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panic_message_extracts_str_and_string() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");
    }
}
