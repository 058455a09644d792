//! HTTP delivery against a mock ingest endpoint.

use std::sync::Arc;
use std::time::{Duration, Instant};

use httpmock::prelude::*;
use rootly_runtime::context::{build_context, Environment};
use rootly_runtime::{
    CapturedError, HttpTransport, Metrics, Payload, Runtime, RuntimeConfig, Severity, Transport,
};

fn payload() -> Payload {
    let error = CapturedError::new("TypeError", "bad id", "TypeError: bad id\n    at api.rs:9:5");
    Payload::new(&error, Some(Severity::Warning), build_context(Environment::Preview, None))
}

fn transport(server: &MockServer, timeout: Duration) -> (HttpTransport, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new());
    let config = RuntimeConfig::new("rk_test_123")
        .with_api_url(server.base_url())
        .with_request_timeout(timeout);
    let transport = HttpTransport::new(&config, Arc::clone(&metrics)).unwrap();
    (transport, metrics)
}

/// Test: payload is POSTed as JSON with bearer auth
#[test]
fn test_posts_json_with_bearer_auth() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/ingest")
            .header("authorization", "Bearer rk_test_123")
            .header("content-type", "application/json")
            .body_includes(r#""severity":"warning""#)
            .body_includes(r#""type":"TypeError""#)
            .body_includes(r#""environment":"preview""#);
        then.status(201).body("{\"ok\":true}");
    });

    let (transport, metrics) = transport(&server, Duration::from_secs(5));
    transport.send(payload()).unwrap();

    assert!(transport.flush(Duration::from_secs(5)));
    assert_eq!(transport.pending(), 0);
    mock.assert();
    assert_eq!(metrics.sent(), 1);
    assert_eq!(metrics.send_failed(), 0);
}

/// Test: a non-2xx response is swallowed and counted
#[test]
fn test_server_error_is_swallowed() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/ingest");
        then.status(500).body("internal");
    });

    let (transport, metrics) = transport(&server, Duration::from_secs(5));
    transport.send(payload()).unwrap();

    assert!(transport.flush(Duration::from_secs(5)));
    mock.assert_calls(1);
    assert_eq!(metrics.sent(), 0);
    assert_eq!(metrics.send_failed(), 1);
}

/// Test: a slow endpoint times out once and releases its pending slot
#[test]
fn test_timeout_releases_pending_slot() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/ingest");
        then.status(200).delay(Duration::from_millis(800));
    });

    let (transport, metrics) = transport(&server, Duration::from_millis(100));
    transport.send(payload()).unwrap();
    assert_eq!(transport.pending(), 1);

    assert!(transport.flush(Duration::from_secs(5)));
    assert_eq!(transport.pending(), 0);
    assert_eq!(metrics.send_failed(), 1);
}

/// Test: flush with a short deadline reports outstanding work
#[test]
fn test_flush_deadline_expires() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/ingest");
        then.status(200).delay(Duration::from_millis(1500));
    });

    let (transport, _) = transport(&server, Duration::from_secs(5));
    transport.send(payload()).unwrap();

    assert!(!transport.flush(Duration::from_millis(50)));
    assert!(transport.flush(Duration::from_secs(5)));
    assert_eq!(transport.pending(), 0);
}

/// Test: overlapping flushes both observe the drain
#[test]
fn test_overlapping_flushes_both_drain() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/ingest");
        then.status(200).delay(Duration::from_millis(300));
    });

    let (transport, metrics) = transport(&server, Duration::from_secs(5));
    let transport = Arc::new(transport);
    transport.send(payload()).unwrap();

    let short = {
        let transport = Arc::clone(&transport);
        std::thread::spawn(move || transport.flush(Duration::from_millis(200)))
    };
    std::thread::sleep(Duration::from_millis(20));
    let long = {
        let transport = Arc::clone(&transport);
        std::thread::spawn(move || {
            let started = Instant::now();
            (transport.flush(Duration::from_secs(3)), started.elapsed())
        })
    };

    assert!(!short.join().unwrap());
    let (drained, waited) = long.join().unwrap();
    assert!(drained);
    assert!(waited < Duration::from_secs(2), "waited {waited:?}");
    assert_eq!(transport.pending(), 0);
    mock.assert();
    assert_eq!(metrics.sent(), 1);
}

/// Test: a flush after an expired flush still drains new sends
#[test]
fn test_flush_is_repeatable() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/ingest");
        then.status(200).delay(Duration::from_millis(100));
    });

    let (transport, metrics) = transport(&server, Duration::from_secs(5));
    transport.send(payload()).unwrap();
    assert!(!transport.flush(Duration::from_millis(10)));
    transport.send(payload()).unwrap();
    assert!(transport.flush(Duration::from_secs(5)));
    assert_eq!(metrics.sent(), 2);
}

/// Test: an unreachable endpoint never surfaces to the caller
#[test]
fn test_connection_refused_is_swallowed() {
    let metrics = Arc::new(Metrics::new());
    let config = RuntimeConfig::new("rk_test").with_api_url("http://127.0.0.1:1");
    let transport = HttpTransport::new(&config, Arc::clone(&metrics)).unwrap();

    transport.send(payload()).unwrap();
    assert!(transport.flush(Duration::from_secs(5)));
    assert_eq!(metrics.send_failed(), 1);
}

/// Test: the default runtime delivers through HTTP end to end
#[test]
fn test_runtime_with_http_transport() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/ingest")
            .body_includes(r#""message":"disk full""#)
            .body_includes(r#""environment":"production""#);
        then.status(200);
    });

    let config = RuntimeConfig::new("rk_test").with_api_url(format!("{}/", server.base_url()));
    let runtime = Runtime::builder(config).build().unwrap();

    assert!(runtime.capture_failure("disk full", None).is_sent());
    assert!(runtime.flush(Duration::from_secs(5)));
    mock.assert();
    assert_eq!(runtime.metrics().sent(), 1);
}

/// Test: flushing inside an async host does not deadlock
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_flush_from_async_context() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/ingest");
            then.status(202);
        })
        .await;

    let (transport, metrics) = transport(&server, Duration::from_secs(5));
    transport.send(payload()).unwrap();
    let drained = tokio::task::spawn_blocking(move || {
        let drained = transport.flush(Duration::from_secs(5));
        drop(transport);
        drained
    })
    .await
    .unwrap();

    assert!(drained);
    mock.assert_async().await;
    assert_eq!(metrics.sent(), 1);
}
