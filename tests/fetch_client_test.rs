//! Integration tests for the quota fetch client against a mock server.
//!
//! Covers:
//! - Parsing a real-shaped quota body
//! - Retry with backoff on 5xx, Retry-After on 429
//! - Non-retryable classification (401, 404, missing entry)
//! - Per-attempt timeout and cancellation during backoff

mod common;

use std::time::{Duration, Instant};

use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use quotabar::core::fetch::{FetchClient, FetchOptions, UsageFetcher};
use quotabar::error::FetchErrorKind;

use common::fixtures::{
    QUOTA_PATH, body_without_premium, endpoint, mount_quota, mount_status_times, quota_body,
};
use common::logger::TestLogger;

fn fast_options(max_attempts: u32) -> FetchOptions {
    FetchOptions {
        timeout: Duration::from_secs(5),
        max_attempts,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(2),
    }
}

fn client(server: &MockServer, options: FetchOptions) -> FetchClient {
    FetchClient::with_endpoint(endpoint(server))
        .expect("client build")
        .options(options)
}

// =============================================================================
// Success
// =============================================================================

#[tokio::test]
async fn parses_premium_entry() {
    let log = TestLogger::new("parses_premium_entry");
    log.phase("setup");
    let server = MockServer::start().await;
    mount_quota(&server, quota_body(300.0, 250.0, 5.0)).await;

    log.phase("execute");
    let snapshot = client(&server, fast_options(3))
        .budget_total(50.0)
        .fetch("token", &CancellationToken::new())
        .await
        .expect("fetch should succeed");

    log.phase("verify");
    assert!((snapshot.included_used - 50.0).abs() < f64::EPSILON);
    assert!((snapshot.included_total - 300.0).abs() < f64::EPSILON);
    assert!((snapshot.budget_used - 5.0).abs() < f64::EPSILON);
    assert!((snapshot.budget_total - 50.0).abs() < f64::EPSILON);
    assert!(!snapshot.unlimited);
    assert!(snapshot.period_end.is_some());
    log.finish_ok();
}

#[tokio::test]
async fn sends_expected_headers() {
    let log = TestLogger::new("sends_expected_headers");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(QUOTA_PATH))
        .and(header("authorization", "Bearer secret-token"))
        .and(header("accept", "application/json"))
        .and(header_regex("user-agent", "^quotabar/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(quota_body(300.0, 300.0, 0.0)))
        .expect(1)
        .mount(&server)
        .await;

    let url = endpoint(&server);
    log.http_request("GET", &url);
    let snapshot = client(&server, fast_options(1))
        .fetch("secret-token", &CancellationToken::new())
        .await
        .expect("headers should match");
    assert!(snapshot.included_used.abs() < f64::EPSILON);
    log.finish_ok();
}

#[tokio::test]
async fn custom_quota_key_reads_other_entry() {
    let server = MockServer::start().await;
    mount_quota(&server, quota_body(300.0, 250.0, 0.0)).await;

    let snapshot = client(&server, fast_options(1))
        .quota_key("chat")
        .fetch("token", &CancellationToken::new())
        .await
        .expect("chat entry exists");
    assert!(snapshot.unlimited);
}

// =============================================================================
// Retry
// =============================================================================

#[tokio::test]
async fn retries_server_errors_then_succeeds() {
    let log = TestLogger::new("retries_server_errors_then_succeeds");
    log.phase("setup");
    let server = MockServer::start().await;
    mount_status_times(&server, 500, 2).await;
    mount_quota(&server, quota_body(300.0, 250.0, 5.0)).await;

    log.phase("execute");
    let started = Instant::now();
    let result = client(&server, fast_options(3))
        .fetch("token", &CancellationToken::new())
        .await;
    let elapsed = started.elapsed();

    log.phase("verify");
    let snapshot = assert_ok!(result, "third attempt should succeed");
    assert!((snapshot.included_used - 50.0).abs() < f64::EPSILON);
    // 100ms after the first failure, 200ms after the second
    assert!(elapsed >= Duration::from_millis(300), "elapsed {elapsed:?}");
    let requests = server.received_requests().await.expect("recording on");
    assert_eq!(requests.len(), 3);
    log.finish_ok();
}

#[tokio::test]
async fn default_backoff_waits_one_then_two_seconds() {
    let log = TestLogger::new("default_backoff_waits_one_then_two_seconds");
    log.phase("setup");
    let server = MockServer::start().await;
    mount_status_times(&server, 500, 2).await;
    mount_quota(&server, quota_body(300.0, 250.0, 5.0)).await;

    log.phase("execute");
    let started = Instant::now();
    let result = client(&server, FetchOptions::default())
        .fetch("token", &CancellationToken::new())
        .await;
    let elapsed = started.elapsed();

    log.phase("verify");
    assert_ok!(result, "third attempt should succeed");
    let requests = server.received_requests().await.expect("recording on");
    assert_eq!(requests.len(), 3);
    assert!(elapsed >= Duration::from_millis(3000), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(4500), "elapsed {elapsed:?}");
    log.finish_ok();
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    mount_status_times(&server, 503, 10).await;

    let err = client(&server, fast_options(2))
        .fetch("token", &CancellationToken::new())
        .await
        .expect_err("all attempts fail");
    assert_eq!(err.kind, FetchErrorKind::Server);
    assert_eq!(err.status, Some(503));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn honours_retry_after() {
    let log = TestLogger::new("honours_retry_after");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(QUOTA_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_quota(&server, quota_body(300.0, 200.0, 0.0)).await;

    let started = Instant::now();
    let snapshot = client(&server, fast_options(3))
        .fetch("token", &CancellationToken::new())
        .await
        .expect("second attempt succeeds");
    let elapsed = started.elapsed();

    assert!((snapshot.included_used - 100.0).abs() < f64::EPSILON);
    assert!(elapsed >= Duration::from_secs(1), "elapsed {elapsed:?}");
    log.finish_ok();
}

// =============================================================================
// Non-retryable failures
// =============================================================================

#[tokio::test]
async fn unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    mount_status_times(&server, 401, 10).await;

    let err = client(&server, fast_options(3))
        .fetch("bad-token", &CancellationToken::new())
        .await
        .expect_err("401 fails");
    assert_eq!(err.kind, FetchErrorKind::Auth);
    assert!(!err.retryable());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn not_found_means_no_subscription() {
    let server = MockServer::start().await;
    mount_status_times(&server, 404, 10).await;

    let err = client(&server, fast_options(3))
        .fetch("token", &CancellationToken::new())
        .await
        .expect_err("404 fails");
    assert_eq!(err.kind, FetchErrorKind::NotFound);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn missing_entry_is_validation_error() {
    let server = MockServer::start().await;
    mount_quota(&server, body_without_premium()).await;

    let err = client(&server, fast_options(3))
        .fetch("token", &CancellationToken::new())
        .await
        .expect_err("entry missing");
    assert_eq!(err.kind, FetchErrorKind::Validation);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_body_is_validation_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(QUOTA_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let err = client(&server, fast_options(3))
        .fetch("token", &CancellationToken::new())
        .await
        .expect_err("not JSON");
    assert_eq!(err.kind, FetchErrorKind::Validation);
}

// =============================================================================
// Timeout and cancellation
// =============================================================================

#[tokio::test]
async fn slow_response_times_out_per_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(QUOTA_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(quota_body(300.0, 250.0, 0.0))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let options = FetchOptions {
        timeout: Duration::from_millis(200),
        ..fast_options(1)
    };
    let started = Instant::now();
    let err = client(&server, options)
        .fetch("token", &CancellationToken::new())
        .await
        .expect_err("deadline exceeded");
    assert_eq!(err.kind, FetchErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn cancel_during_backoff_stops_retrying() {
    let server = MockServer::start().await;
    mount_status_times(&server, 500, 10).await;

    let options = FetchOptions {
        base_delay: Duration::from_secs(5),
        max_delay: Duration::from_secs(5),
        ..fast_options(3)
    };
    let fetcher = client(&server, options);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = fetcher.fetch("token", &cancel).await.expect_err("cancelled");
    assert_eq!(err.kind, FetchErrorKind::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert!(!fetcher.is_in_flight());
}
