/*!
 * Process Manager Tests
 * Lookup, blocking launch, liveness probes and launch failures
 */

use pretty_assertions::assert_eq;
use procnet::process::{current_pid, is_alive};
use procnet::{ErrorKind, ProcessConfig, ProcessManager};
use serial_test::serial;
use std::time::Duration;

const NO_ARGS: [&str; 0] = [];

#[test]
fn test_path_exists_for_common_binaries() {
    let pm = ProcessManager::new();
    assert!(pm.path_exists("sh"));
    assert!(pm.path_exists("true"));
    assert!(pm.path_exists("/bin/sh"));
}

#[test]
fn test_path_exists_for_missing_binary() {
    let pm = ProcessManager::new();
    assert!(!pm.path_exists("procnet-no-such-binary"));
    assert!(!pm.path_exists("/nonexistent/dir/sh"));
    assert!(!pm.path_exists(""));
}

#[tokio::test]
async fn test_start_reaps_successful_child() {
    let pm = ProcessManager::new();
    let handle = pm.start("true", NO_ARGS).await.unwrap();

    assert!(handle.is_reaped());
    assert!(handle.success());
    assert_eq!(handle.exit_code(), Some(0));
    assert_eq!(handle.name(), "true");
    // Reaped children leave no zombie behind
    assert!(!pm.is_alive(handle.pid()));
}

#[tokio::test]
async fn test_start_reports_nonzero_exit_without_error() {
    let pm = ProcessManager::new();
    let handle = pm.start("sh", ["-c", "exit 3"]).await.unwrap();

    assert!(!handle.success());
    assert_eq!(handle.exit_code(), Some(3));
    assert_eq!(handle.signal(), None);

    let exit = handle.to_exit().unwrap();
    assert_eq!(exit.code, Some(3));
    assert!(!exit.success);
}

#[tokio::test]
async fn test_run_waits_for_exit() {
    let pm = ProcessManager::new();
    let handle = pm.run("false", NO_ARGS).await.unwrap();

    assert!(handle.is_reaped());
    assert_eq!(handle.exit_code(), Some(1));
    assert!(!pm.is_alive(handle.pid()));
}

#[tokio::test]
#[serial]
async fn test_run_kills_child_when_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    let script = format!("sleep 0.5; touch {}", marker.display());

    let pm = ProcessManager::new();
    let outcome = tokio::time::timeout(
        Duration::from_millis(100),
        pm.run("sh", ["-c", script.as_str()]),
    )
    .await;
    assert!(outcome.is_err(), "run should still be waiting");

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(!marker.exists(), "killed child must not finish its work");
}

#[tokio::test]
async fn test_start_missing_binary_is_launch_failure() {
    let pm = ProcessManager::new();
    let err = pm.start("procnet-no-such-binary", NO_ARGS).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FatalLaunchFailure);
    assert!(!err.kind().is_retryable());
}

#[tokio::test]
async fn test_empty_command_is_rejected() {
    let pm = ProcessManager::new();
    let err = pm.run("  ", NO_ARGS).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_inherit_output_still_reaps() {
    let pm = ProcessManager::with_config(ProcessConfig::new().with_inherit_output(true));
    let handle = pm.start("echo", ["procnet"]).await.unwrap();
    assert!(handle.success());
}

#[test]
fn test_is_alive_probes() {
    assert!(is_alive(current_pid()));
    assert!(!is_alive(0));
    // Above pid_max on every Linux configuration
    assert!(!is_alive(u32::MAX));
    assert!(!is_alive(i32::MAX as u32));
}
