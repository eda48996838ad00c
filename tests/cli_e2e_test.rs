//! End-to-end tests for the quotabar binary.
//!
//! Every invocation runs with `QUOTABAR_HOME` pointing at a temp directory,
//! token variables removed and colors off. Network tests point
//! `QUOTABAR_ENDPOINT` at a mock server.

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::MockServer;

use common::fixtures::{endpoint, mount_quota, mount_status_times, quota_body};
use common::logger::TestLogger;

#[allow(deprecated)]
fn quotabar(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("quotabar").expect("binary built");
    cmd.env("QUOTABAR_HOME", home.path())
        .env("NO_COLOR", "1")
        .env_remove("QUOTABAR_TOKEN")
        .env_remove("GITHUB_TOKEN")
        .env_remove("QUOTABAR_CONFIG")
        .env_remove("QUOTABAR_ENDPOINT")
        .env_remove("QUOTABAR_FORMAT")
        .env_remove("QUOTABAR_REFRESH_INTERVAL")
        .env_remove("QUOTABAR_AUTO_REFRESH")
        .env_remove("QUOTABAR_WARNING_THRESHOLD")
        .env_remove("QUOTABAR_QUOTA_KEY")
        .env_remove("RUST_LOG");
    cmd
}

/// One retry attempt keeps failing runs fast.
fn write_single_attempt_config(home: &TempDir) {
    let dir = home.path().join("config");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("config.toml"),
        "[api]\nmax_attempts = 1\ntimeout_seconds = 5\n",
    )
    .unwrap();
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

// =============================================================================
// Offline commands
// =============================================================================

#[test]
fn help_lists_commands() {
    let log = TestLogger::new("help_lists_commands");
    let home = TempDir::new().unwrap();
    quotabar(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("status")
                .and(predicate::str::contains("watch"))
                .and(predicate::str::contains("auth"))
                .and(predicate::str::contains("cache")),
        );
    log.finish_ok();
}

#[test]
fn unknown_command_is_rejected() {
    let home = TempDir::new().unwrap();
    quotabar(&home)
        .arg("notacommand")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized").or(predicate::str::contains("error")));
}

#[test]
fn config_show_json_reports_sources() {
    let home = TempDir::new().unwrap();
    let output = quotabar(&home)
        .args(["config", "show", "--json"])
        .env("QUOTABAR_REFRESH_INTERVAL", "90")
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    let entries = json.as_array().expect("array of entries");
    let find = |key: &str| {
        entries
            .iter()
            .find(|e| e["key"] == key)
            .cloned()
            .unwrap_or_else(|| panic!("missing {key}"))
    };
    assert_eq!(find("refresh.interval_seconds")["value"], "90");
    assert_eq!(find("refresh.interval_seconds")["source"], "env");
    assert_eq!(find("api.quota_key")["value"], "premium_interactions");
    assert_eq!(find("api.quota_key")["source"], "default");
}

#[test]
fn missing_explicit_config_fails_with_parse_exit_code() {
    let home = TempDir::new().unwrap();
    quotabar(&home)
        .args(["config", "show"])
        .env("QUOTABAR_CONFIG", home.path().join("nope.toml"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("QB-C001"));
}

#[test]
fn cache_show_empty() {
    let home = TempDir::new().unwrap();
    quotabar(&home)
        .args(["cache", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(empty)"));
}

#[test]
fn cache_clear_is_idempotent() {
    let home = TempDir::new().unwrap();
    quotabar(&home).args(["cache", "clear"]).assert().success();
    quotabar(&home).args(["cache", "clear"]).assert().success();
}

#[test]
fn status_signed_out_exits_with_auth_code() {
    let log = TestLogger::new("status_signed_out_exits_with_auth_code");
    let home = TempDir::new().unwrap();
    quotabar(&home)
        .arg("status")
        .env("QUOTABAR_ENDPOINT", "http://127.0.0.1:9/unreachable")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Not signed in"))
        .stderr(predicate::str::contains("QB-A001"));
    log.finish_ok();
}

// =============================================================================
// Against a mock endpoint
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn status_json_with_env_token() {
    let log = TestLogger::new("status_json_with_env_token");
    log.phase("setup");
    let server = MockServer::start().await;
    mount_quota(&server, quota_body(300.0, 250.0, 5.0)).await;
    let home = TempDir::new().unwrap();
    let mut cmd = quotabar(&home);
    cmd.args(["status", "--json"])
        .env("QUOTABAR_TOKEN", "env-token")
        .env("QUOTABAR_ENDPOINT", endpoint(&server));

    log.phase("execute");
    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();

    log.phase("verify");
    assert!(output.status.success(), "{output:?}");
    let json = stdout_json(&output);
    assert_eq!(json["state"], "normal");
    assert_eq!(json["authenticated"], true);
    assert_eq!(json["fromCache"], false);
    assert_eq!(json["snapshot"]["includedUsed"], 50.0);
    assert_eq!(json["snapshot"]["includedTotal"], 300.0);
    assert!(home.path().join("cache/usage-cache.json").exists());
    log.finish_ok();
}

#[tokio::test(flavor = "multi_thread")]
async fn status_falls_back_to_cache_on_server_error() {
    let home = TempDir::new().unwrap();
    write_single_attempt_config(&home);

    let healthy = MockServer::start().await;
    mount_quota(&healthy, quota_body(300.0, 100.0, 0.0)).await;
    let mut first = quotabar(&home);
    first
        .args(["status", "--json"])
        .env("QUOTABAR_TOKEN", "env-token")
        .env("QUOTABAR_ENDPOINT", endpoint(&healthy));
    let output = tokio::task::spawn_blocking(move || first.output().unwrap())
        .await
        .unwrap();
    assert!(output.status.success(), "{output:?}");

    let broken = MockServer::start().await;
    mount_status_times(&broken, 503, 10).await;
    let mut second = quotabar(&home);
    second
        .args(["status", "--json"])
        .env("QUOTABAR_TOKEN", "env-token")
        .env("QUOTABAR_ENDPOINT", endpoint(&broken));
    let output = tokio::task::spawn_blocking(move || second.output().unwrap())
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let json = stdout_json(&output);
    assert_eq!(json["state"], "error");
    assert_eq!(json["fromCache"], true);
    assert_eq!(json["freshness"], "fresh");
    assert_eq!(json["error"]["kind"], "server");
    assert_eq!(json["snapshot"]["includedUsed"], 200.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn status_warns_over_threshold() {
    let server = MockServer::start().await;
    mount_quota(&server, quota_body(300.0, 30.0, 0.0)).await;
    let home = TempDir::new().unwrap();
    let mut cmd = quotabar(&home);
    cmd.arg("status")
        .env("QUOTABAR_TOKEN", "env-token")
        .env("QUOTABAR_ENDPOINT", endpoint(&server))
        .env("QUOTABAR_WARNING_THRESHOLD", "80");
    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[warning]"), "{stdout}");
    assert!(stdout.contains("270 / 300 used"), "{stdout}");
}
