/*!
 * Cancelable Process Tests
 * Token-driven termination, deadlines and manager-wide shutdown
 */

use pretty_assertions::assert_eq;
use procnet::{CancellationReason, CancellationSource, CancellationToken, ProcessManager};
use std::time::{Duration, Instant};

const SIGKILL: i32 = 9;
const JOIN_LIMIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_cancel_kills_and_reaps_child() {
    let pm = ProcessManager::new();
    let source = CancellationSource::new();

    let child = pm
        .run_cancelable(source.token(), "sleep", ["20"])
        .await
        .unwrap();
    let pid = child.pid();

    assert!(pm.is_alive(pid));
    assert_eq!(pm.active_count(), 1);
    assert!(!child.is_finished());

    source.cancel(CancellationReason::UserCancel);
    let handle = child.join_timeout(JOIN_LIMIT).await.unwrap();

    assert_eq!(handle.pid(), pid);
    assert_eq!(handle.signal(), Some(SIGKILL));
    assert!(!handle.success());
    assert!(!pm.is_alive(pid));
    assert_eq!(pm.active_count(), 0);
}

#[tokio::test]
async fn test_deadline_cancels_child() {
    let pm = ProcessManager::new();
    let source = CancellationSource::with_timeout(Duration::from_millis(100));

    let started = Instant::now();
    let child = pm
        .run_cancelable(source.token(), "sleep", ["20"])
        .await
        .unwrap();
    let handle = child.join_timeout(JOIN_LIMIT).await.unwrap();

    assert_eq!(handle.signal(), Some(SIGKILL));
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(started.elapsed() < JOIN_LIMIT);
}

#[tokio::test]
async fn test_child_that_exits_first_is_reported_normally() {
    let pm = ProcessManager::new();
    let source = CancellationSource::new();

    let child = pm
        .run_cancelable(source.token(), "sh", ["-c", "exit 7"])
        .await
        .unwrap();
    let handle = child.join_timeout(JOIN_LIMIT).await.unwrap();
    assert_eq!(handle.exit_code(), Some(7));

    // Cancelling after exit is a no-op
    source.cancel(CancellationReason::UserCancel);
    assert_eq!(pm.active_count(), 0);
}

#[tokio::test]
async fn test_shutdown_cancels_every_child() {
    let pm = ProcessManager::new();
    let first = pm
        .run_cancelable(CancellationToken::never(), "sleep", ["20"])
        .await
        .unwrap();
    let second = pm
        .run_cancelable(CancellationToken::never(), "sleep", ["20"])
        .await
        .unwrap();

    assert_eq!(pm.active_count(), 2);
    assert_eq!(pm.clone().shutdown(), 2);

    for child in [first, second] {
        let handle = child.join_timeout(JOIN_LIMIT).await.unwrap();
        assert_eq!(handle.signal(), Some(SIGKILL));
    }
    assert_eq!(pm.active_count(), 0);
    assert_eq!(pm.shutdown(), 0);
}

#[tokio::test]
async fn test_join_timeout_expires_for_running_child() {
    let pm = ProcessManager::new();
    let source = CancellationSource::new();
    let child = pm
        .run_cancelable(source.token(), "sleep", ["20"])
        .await
        .unwrap();
    let pid = child.pid();

    let reaper = child.into_reaper();
    let (err, reaper) = reaper
        .join_timeout(Duration::from_millis(50))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), procnet::ErrorKind::Timeout);

    // The reaper is handed back and still owns the child
    let reaper = reaper.unwrap();
    assert!(pm.is_alive(pid));
    source.cancel(CancellationReason::Custom("test over".into()));
    let handle = reaper.join().await.unwrap().unwrap();
    assert_eq!(handle.signal(), Some(SIGKILL));
}

#[tokio::test]
async fn test_abort_releases_registry_entry() {
    let pm = ProcessManager::new();
    let child = pm
        .run_cancelable(CancellationToken::never(), "sleep", ["20"])
        .await
        .unwrap();
    assert_eq!(pm.active_count(), 1);

    child.abort();
    let err = child.join().await.unwrap_err();
    assert!(matches!(err, procnet::ProcessError::ReaperFailed { .. }));

    // The aborted reaper future is dropped before join returns
    assert_eq!(pm.active_count(), 0);
    assert_eq!(pm.shutdown(), 0);
}
