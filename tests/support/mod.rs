//! Shared helpers for integration tests.
#![allow(dead_code)]

#[macro_use]
pub mod socket_guard;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use annex_sync_core::{DownloadOptions, RetryPolicy};
use wiremock::{Request, Respond, ResponseTemplate};

/// Minimal bytes that look like a PDF.
pub const PDF_BODY: &[u8] = b"%PDF-1.4\n1 0 obj\n<<>>\nendobj\ntrailer\n<<>>\n%%EOF\n";

/// Options with no sleeps, for fast tests.
pub fn fast_options(max_concurrency: usize, max_attempts: u32) -> DownloadOptions {
    DownloadOptions {
        max_concurrency,
        retry: RetryPolicy::new(max_attempts, Duration::ZERO),
        inter_request_delay: Duration::ZERO,
        overwrite_existing: false,
        parallel: true,
    }
}

/// Fails the first `fail_count` requests with 500, then serves `body` as a PDF.
pub struct FlakyResponder {
    pub request_count: Arc<AtomicUsize>,
    pub fail_count: usize,
    pub body: Vec<u8>,
}

impl FlakyResponder {
    pub fn new(fail_count: usize, body: &[u8]) -> (Self, Arc<AtomicUsize>) {
        let request_count = Arc::new(AtomicUsize::new(0));
        (
            Self {
                request_count: Arc::clone(&request_count),
                fail_count,
                body: body.to_vec(),
            },
            request_count,
        )
    }
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.request_count.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_count {
            ResponseTemplate::new(500).set_body_bytes(b"internal server error".to_vec())
        } else {
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(self.body.clone())
        }
    }
}
