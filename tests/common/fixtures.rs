//! Quota endpoint bodies and mock server setup.
#![allow(dead_code)]

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const QUOTA_PATH: &str = "/copilot_internal/user";

/// A `premium_interactions` entry with the given counters.
#[must_use]
pub fn quota_body(entitlement: f64, remaining: f64, overage: f64) -> Value {
    json!({
        "quota_reset_date_utc": "2026-11-01T00:00:00Z",
        "quota_snapshots": {
            "premium_interactions": {
                "entitlement": entitlement,
                "remaining": remaining,
                "overage_count": overage,
                "unlimited": false
            },
            "chat": {
                "entitlement": 0,
                "remaining": 0,
                "unlimited": true
            }
        }
    })
}

/// Body without the premium entry.
#[must_use]
pub fn body_without_premium() -> Value {
    json!({ "quota_snapshots": { "chat": { "unlimited": true } } })
}

/// Endpoint URL on a running mock server.
#[must_use]
pub fn endpoint(server: &MockServer) -> String {
    format!("{}{QUOTA_PATH}", server.uri())
}

/// Always answer with `body`.
pub async fn mount_quota(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path(QUOTA_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Answer with `status` for the next `times` requests.
pub async fn mount_status_times(server: &MockServer, status: u16, times: u64) {
    Mock::given(method("GET"))
        .and(path(QUOTA_PATH))
        .respond_with(ResponseTemplate::new(status))
        .up_to_n_times(times)
        .with_priority(1)
        .mount(server)
        .await;
}
