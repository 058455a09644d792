//! Dropping the guard returned by `init` drains in-flight sends.
//!
//! Separate file because `init` succeeds once per process.

use std::time::Duration;

use httpmock::prelude::*;
use rootly_runtime::InitOptions;

/// Test: guard drop waits for a slow send within the shutdown grace
#[test]
fn test_guard_drop_drains_pending_sends() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/ingest")
            .body_includes("shutting down");
        then.status(200).delay(Duration::from_millis(100));
    });

    let guard =
        rootly_runtime::init(InitOptions::new("rk_live_drain").with_api_url(server.base_url()))
            .expect("init succeeds");

    assert!(rootly_runtime::capture_error("shutting down", None).is_sent());
    assert_eq!(rootly_runtime::pending_requests(), 1);

    drop(guard);

    assert_eq!(rootly_runtime::pending_requests(), 0);
    mock.assert();
}
