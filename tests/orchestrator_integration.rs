//! Integration tests for the download orchestrator.
//!
//! Network behaviour is exercised against wiremock; the concurrency bound uses
//! an instrumented in-memory transport.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use annex_sync_core::download::{BodyStream, FetchedResponse};
use annex_sync_core::{
    DownloadBatch, DownloadError, DownloadOrchestrator, DownloadOutcome, HttpClient,
    OrchestratorError, RetryPolicy, Transport,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, Request, Respond, ResponseTemplate};

#[macro_use]
mod support;
use support::{FlakyResponder, PDF_BODY, fast_options};

fn orchestrator(max_concurrency: usize, max_attempts: u32) -> DownloadOrchestrator {
    DownloadOrchestrator::new(
        Arc::new(HttpClient::new()),
        fast_options(max_concurrency, max_attempts),
    )
    .unwrap()
}

fn pdf_response() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "application/pdf")
        .set_body_bytes(PDF_BODY.to_vec())
}

#[tokio::test]
async fn test_download_writes_file_under_logical_name() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/anexo_i.pdf"))
        .respond_with(pdf_response())
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new()?;
    let batch: DownloadBatch = [("Anexo_I.pdf", format!("{}/anexo_i.pdf", mock_server.uri()))]
        .into_iter()
        .collect();

    let report = orchestrator(2, 3).download_all(&batch, dir.path()).await?;

    let expected = dir.path().canonicalize()?.join("Anexo_I.pdf");
    assert_eq!(report.paths(), vec![expected.as_path()]);
    assert_eq!(std::fs::read(&expected)?, PDF_BODY);
    assert_eq!(report.stats().completed(), 1);
    assert!(report.is_complete());
    Ok(())
}

#[tokio::test]
async fn test_second_run_makes_no_requests() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/a.pdf"))
        .respond_with(pdf_response())
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b.pdf"))
        .respond_with(pdf_response())
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new()?;
    let batch: DownloadBatch = [
        ("Anexo_I.pdf", format!("{}/a.pdf", mock_server.uri())),
        ("Anexo_II.pdf", format!("{}/b.pdf", mock_server.uri())),
    ]
    .into_iter()
    .collect();
    let orchestrator = orchestrator(2, 3);

    let first = orchestrator.download_all(&batch, dir.path()).await?;
    assert_eq!(first.stats().completed(), 2);

    let second = orchestrator.download_all(&batch, dir.path()).await?;
    assert_eq!(second.stats().completed(), 0);
    assert_eq!(second.stats().skipped(), 2);
    assert!(
        second
            .results()
            .iter()
            .all(|r| matches!(r.outcome, DownloadOutcome::AlreadyPresent(_)) && r.attempts == 0)
    );

    let mut first_paths = first.paths();
    let mut second_paths = second.paths();
    first_paths.sort();
    second_paths.sort();
    assert_eq!(first_paths, second_paths);
    assert_eq!(mock_server.received_requests().await.unwrap_or_default().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_overwrite_redownloads_existing_file() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/a.pdf"))
        .respond_with(pdf_response())
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new()?;
    std::fs::write(dir.path().join("Anexo_I.pdf"), b"stale")?;
    let batch: DownloadBatch = [("Anexo_I.pdf", format!("{}/a.pdf", mock_server.uri()))]
        .into_iter()
        .collect();
    let mut options = fast_options(1, 1);
    options.overwrite_existing = true;
    let orchestrator = DownloadOrchestrator::new(Arc::new(HttpClient::new()), options)?;

    let report = orchestrator.download_all(&batch, dir.path()).await?;

    assert_eq!(report.stats().completed(), 1);
    assert_eq!(std::fs::read(dir.path().join("Anexo_I.pdf"))?, PDF_BODY);
    Ok(())
}

/// Always answers 500 and records, per call, whether the sibling files were
/// already on disk when the call arrived.
struct SiblingWatchResponder {
    siblings: Vec<PathBuf>,
    observed: Arc<Mutex<Vec<bool>>>,
}

impl Respond for SiblingWatchResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let all_present = self.siblings.iter().all(|p| p.exists());
        if let Ok(mut observed) = self.observed.lock() {
            observed.push(all_present);
        }
        ResponseTemplate::new(500)
    }
}

#[tokio::test]
async fn test_failing_url_does_not_block_siblings() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    let dir = TempDir::new()?;
    let observed = Arc::new(Mutex::new(Vec::new()));
    Mock::given(method("GET"))
        .and(path("/ok1.pdf"))
        .respond_with(pdf_response())
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ok2.pdf"))
        .respond_with(pdf_response())
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken.pdf"))
        .respond_with(SiblingWatchResponder {
            siblings: vec![dir.path().join("one.pdf"), dir.path().join("two.pdf")],
            observed: Arc::clone(&observed),
        })
        .expect(3)
        .mount(&mock_server)
        .await;

    let uri = mock_server.uri();
    let batch: DownloadBatch = [
        ("one.pdf", format!("{uri}/ok1.pdf")),
        ("broken.pdf", format!("{uri}/broken.pdf")),
        ("two.pdf", format!("{uri}/ok2.pdf")),
    ]
    .into_iter()
    .collect();
    let mut options = fast_options(2, 3);
    options.retry = RetryPolicy::new(3, Duration::from_millis(200));
    let orchestrator = DownloadOrchestrator::new(Arc::new(HttpClient::new()), options)?;

    let report = orchestrator.download_all(&batch, dir.path()).await?;

    assert_eq!(report.requested(), 3);
    assert_eq!(report.results().len(), 3);
    assert_eq!(report.succeeded(), 2);
    assert!(!report.is_complete());
    assert!(dir.path().join("one.pdf").exists());
    assert!(dir.path().join("two.pdf").exists());
    assert!(!dir.path().join("broken.pdf").exists());

    // Both good files were written while the broken one was still retrying.
    let observed = observed.lock().map_err(|_| "observation lock poisoned")?.clone();
    assert_eq!(observed.len(), 3);
    assert_eq!(observed.last(), Some(&true));

    let broken = report
        .results()
        .iter()
        .find(|r| r.request.name() == "broken.pdf")
        .ok_or("missing result for broken.pdf")?;
    assert_eq!(broken.attempts, 3);
    assert!(matches!(broken.outcome, DownloadOutcome::Failed { .. }));
    assert_eq!(report.stats().failed(), 1);
    assert_eq!(report.stats().retried(), 2);
    Ok(())
}

#[tokio::test]
async fn test_extension_inferred_from_content_type() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/download/42"))
        .respond_with(pdf_response())
        .mount(&mock_server)
        .await;

    let dir = TempDir::new()?;
    let batch: DownloadBatch = [("relatorio", format!("{}/download/42", mock_server.uri()))]
        .into_iter()
        .collect();

    let report = orchestrator(1, 1).download_all(&batch, dir.path()).await?;

    let expected = dir.path().canonicalize()?.join("relatorio.pdf");
    assert_eq!(report.paths(), vec![expected.as_path()]);
    assert!(expected.exists());
    assert!(!dir.path().join("relatorio").exists());
    Ok(())
}

#[tokio::test]
async fn test_unknown_content_type_keeps_name() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/blob"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/x-annex-unknown")
                .set_body_bytes(b"data".to_vec()),
        )
        .mount(&mock_server)
        .await;

    let dir = TempDir::new()?;
    let batch: DownloadBatch = [("dados", format!("{}/blob", mock_server.uri()))]
        .into_iter()
        .collect();

    let report = orchestrator(1, 1).download_all(&batch, dir.path()).await?;

    let expected = dir.path().canonicalize()?.join("dados");
    assert_eq!(report.paths(), vec![expected.as_path()]);
    Ok(())
}

#[tokio::test]
async fn test_inferred_name_already_present_is_not_rewritten()
-> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/download/42"))
        .respond_with(pdf_response())
        .mount(&mock_server)
        .await;

    let dir = TempDir::new()?;
    std::fs::write(dir.path().join("relatorio.pdf"), b"kept")?;
    let batch: DownloadBatch = [("relatorio", format!("{}/download/42", mock_server.uri()))]
        .into_iter()
        .collect();

    let report = orchestrator(1, 1).download_all(&batch, dir.path()).await?;

    assert!(matches!(
        report.results()[0].outcome,
        DownloadOutcome::AlreadyPresent(_)
    ));
    assert_eq!(std::fs::read(dir.path().join("relatorio.pdf"))?, b"kept");
    Ok(())
}

#[tokio::test]
async fn test_retry_succeeds_within_budget() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    let (responder, calls) = FlakyResponder::new(2, PDF_BODY);
    Mock::given(method("GET"))
        .and(path("/flaky.pdf"))
        .respond_with(responder)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new()?;
    let batch: DownloadBatch = [("Anexo_I.pdf", format!("{}/flaky.pdf", mock_server.uri()))]
        .into_iter()
        .collect();

    let report = orchestrator(1, 3).download_all(&batch, dir.path()).await?;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.results()[0].attempts, 3);
    assert!(report.results()[0].is_success());
    assert_eq!(std::fs::read(dir.path().join("Anexo_I.pdf"))?, PDF_BODY);
    Ok(())
}

#[tokio::test]
async fn test_retry_stops_at_max_attempts() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    let (responder, calls) = FlakyResponder::new(10, PDF_BODY);
    Mock::given(method("GET"))
        .and(path("/down.pdf"))
        .respond_with(responder)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new()?;
    let batch: DownloadBatch = [("Anexo_I.pdf", format!("{}/down.pdf", mock_server.uri()))]
        .into_iter()
        .collect();

    let report = orchestrator(1, 4).download_all(&batch, dir.path()).await?;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(report.results()[0].attempts, 4);
    assert!(report.paths().is_empty());
    assert!(!dir.path().join("Anexo_I.pdf").exists());
    assert!(!dir.path().join("Anexo_I.pdf.part").exists());
    Ok(())
}

#[tokio::test]
async fn test_sequential_mode_downloads_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(pdf_response())
        .mount(&mock_server)
        .await;

    let dir = TempDir::new()?;
    let uri = mock_server.uri();
    let batch: DownloadBatch = [
        ("a.pdf", format!("{uri}/a.pdf")),
        ("b.pdf", format!("{uri}/b.pdf")),
        ("c.pdf", format!("{uri}/c.pdf")),
    ]
    .into_iter()
    .collect();
    let mut options = fast_options(2, 1);
    options.parallel = false;
    options.inter_request_delay = Duration::from_millis(5);
    let orchestrator = DownloadOrchestrator::new(Arc::new(HttpClient::new()), options)?;

    let report = orchestrator.download_all(&batch, dir.path()).await?;

    let names: Vec<&str> = report.results().iter().map(|r| r.request.name()).collect();
    assert_eq!(names, vec!["a.pdf", "b.pdf", "c.pdf"]);
    let requested: Vec<String> = mock_server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(requested, vec!["/a.pdf", "/b.pdf", "/c.pdf"]);
    Ok(())
}

#[tokio::test]
async fn test_unwritable_destination_fails_before_requests()
-> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(pdf_response())
        .expect(0)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new()?;
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file in the way")?;
    let batch: DownloadBatch = [("Anexo_I.pdf", format!("{}/a.pdf", mock_server.uri()))]
        .into_iter()
        .collect();

    let result = orchestrator(1, 1)
        .download_all(&batch, &blocker.join("sub"))
        .await;

    assert!(matches!(result, Err(OrchestratorError::CreateDir { .. })));
    Ok(())
}

/// Transport that records how many requests are in flight at once.
struct GaugedTransport {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl GaugedTransport {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Transport for GaugedTransport {
    async fn get(&self, _url: &str) -> Result<FetchedResponse, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(20)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let body: BodyStream =
            futures_util::stream::iter(vec![Ok(Bytes::from_static(PDF_BODY))]).boxed();
        Ok(FetchedResponse {
            content_type: Some("application/pdf".to_string()),
            body,
        })
    }
}

#[tokio::test]
async fn test_in_flight_requests_never_exceed_cap() -> Result<(), Box<dyn std::error::Error>> {
    let transport = Arc::new(GaugedTransport::new());
    let orchestrator = DownloadOrchestrator::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        fast_options(2, 1),
    )?;

    let dir = TempDir::new()?;
    let batch: DownloadBatch = (0..10)
        .map(|i| (format!("file_{i}.pdf"), format!("https://example.test/{i}.pdf")))
        .collect();

    let report = orchestrator.download_all(&batch, dir.path()).await?;

    assert_eq!(report.succeeded(), 10);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 10);
    assert_eq!(transport.peak.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_pool_smaller_than_cap_for_small_batches() -> Result<(), Box<dyn std::error::Error>>
{
    let transport = Arc::new(GaugedTransport::new());
    let orchestrator = DownloadOrchestrator::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        fast_options(8, 1),
    )?;

    let dir = TempDir::new()?;
    let batch: DownloadBatch = (0..3)
        .map(|i| (format!("file_{i}.pdf"), format!("https://example.test/{i}.pdf")))
        .collect();

    let report = orchestrator.download_all(&batch, dir.path()).await?;

    assert_eq!(report.succeeded(), 3);
    assert!(transport.peak.load(Ordering::SeqCst) <= 3);
    Ok(())
}
