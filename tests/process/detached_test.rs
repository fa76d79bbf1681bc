/*!
 * Detached Process Tests
 * Process-group isolation and completion records
 */

use nix::unistd::{getpgid, getpgrp, Pid as NixPid};
use pretty_assertions::assert_eq;
use procnet::process::{CompletionRecord, COMPLETION_MESSAGE};
use procnet::{ProcessConfig, ProcessManager};
use std::path::Path;
use std::time::Duration;

fn read_records(path: &Path) -> Vec<CompletionRecord> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_detached_child_leads_own_group() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("logs.txt");
    let pm = ProcessManager::with_config(ProcessConfig::new().with_detached_log_path(&log));

    let detached = pm.start_detached("sleep", ["0.3"]).await.unwrap();
    let pid = detached.pid();
    assert_eq!(detached.pgid(), pid);

    let group = getpgid(Some(NixPid::from_raw(pid as i32))).unwrap();
    assert_eq!(group.as_raw() as u32, pid);
    assert_ne!(group, getpgrp());

    let exit = detached.into_monitor().join().await.unwrap().unwrap();
    assert!(exit.success);

    let records = read_records(&log);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message, COMPLETION_MESSAGE);
    assert_eq!(records[0].pid, pid);
    assert_eq!(records[0].exit, Some(exit));
}

#[tokio::test]
async fn test_record_written_after_delay() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("logs.txt");
    let config = ProcessConfig::new()
        .with_detached_log_path(&log)
        .with_detached_record_delay(Duration::from_millis(300));
    let pm = ProcessManager::with_config(config);

    let detached = pm.start_detached("true", [] as [&str; 0]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!log.exists(), "record must wait for the drain delay");

    detached.into_monitor().join().await.unwrap().unwrap();
    assert_eq!(read_records(&log).len(), 1);
}

#[tokio::test]
async fn test_records_append() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("logs.txt");
    let pm = ProcessManager::with_config(ProcessConfig::new().with_detached_log_path(&log));

    let first = pm.start_detached("true", [] as [&str; 0]).await.unwrap();
    let second = pm.start_detached("sh", ["-c", "exit 2"]).await.unwrap();
    first.into_monitor().join().await.unwrap().unwrap();
    let failed = second.into_monitor().join().await.unwrap().unwrap();
    assert_eq!(failed.code, Some(2));

    let records = read_records(&log);
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.message == COMPLETION_MESSAGE));
}

#[tokio::test]
async fn test_unwritable_log_does_not_fail_monitor() {
    let pm = ProcessManager::with_config(
        ProcessConfig::new().with_detached_log_path("/nonexistent/procnet/logs.txt"),
    );
    let detached = pm.start_detached("true", [] as [&str; 0]).await.unwrap();
    let exit = detached.into_monitor().join().await.unwrap().unwrap();
    assert!(exit.success);
}
