//! Skips wiremock tests where a localhost socket cannot be bound.
//!
//! Set `ANNEX_SYNC_REQUIRE_SOCKET_TESTS=1` to turn the skip into a failure.

use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "ANNEX_SYNC_REQUIRE_SOCKET_TESTS";

fn socket_tests_required() -> bool {
    std::env::var(REQUIRE_ENV)
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Returns true (after logging) when localhost cannot be bound.
#[track_caller]
pub fn localhost_unavailable() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return false;
    }

    let location = Location::caller();
    let message = format!(
        "[socket-bound-test] cannot bind localhost at {}:{}",
        location.file(),
        location.line()
    );
    assert!(!socket_tests_required(), "{message} and {REQUIRE_ENV} is set");
    eprintln!("{message}; skipping. Set {REQUIRE_ENV}=1 to fail instead.");
    true
}

pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if localhost_unavailable() {
        None
    } else {
        Some(MockServer::start().await)
    }
}

/// Binds a fresh `MockServer`, returning `Ok(())` from the test when sockets are unavailable.
macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = crate::support::socket_guard::start_mock_server_or_skip().await
        else {
            return Ok(());
        };
        mock_server
    }};
}
