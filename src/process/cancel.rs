/*!
 * Cancellation
 *
 * A `CancellationSource` controls cancellation; `CancellationToken`s are
 * cheap clones handed to cancelable work. A source may carry a deadline,
 * after which every token reports `Timeout` without an explicit cancel.
 */

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Reason for cancellation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    /// Caller-initiated cancellation
    UserCancel,
    /// Deadline elapsed
    Timeout,
    /// Process-wide shutdown in progress
    Shutdown,
    /// Custom reason with description
    Custom(String),
}

/// Controller that can trigger cancellation
#[derive(Debug, Clone)]
pub struct CancellationSource {
    tx: Arc<watch::Sender<Option<CancellationReason>>>,
    deadline: Option<Instant>,
}

impl CancellationSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            deadline: None,
        }
    }

    /// Source whose tokens time out `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        let mut source = Self::new();
        source.deadline = Some(Instant::now() + timeout);
        source
    }

    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            rx: self.tx.subscribe(),
            deadline: self.deadline,
        }
    }

    /// Cancel with the given reason. Only the first reason is kept.
    pub fn cancel(&self, reason: CancellationReason) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.token().is_cancelled()
    }

    /// Whether both handles control the same cancellation
    pub(crate) fn same_source(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle observed by cancelable work
#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<Option<CancellationReason>>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Token that never cancels
    pub fn never() -> Self {
        CancellationSource::new().token()
    }

    pub fn reason(&self) -> Option<CancellationReason> {
        if let Some(reason) = self.rx.borrow().clone() {
            return Some(reason);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancellationReason::Timeout),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Wait until cancelled or the deadline passes
    ///
    /// Pends forever if every source is dropped without cancelling and there
    /// is no deadline.
    pub async fn cancelled(&self) -> CancellationReason {
        let mut rx = self.rx.clone();
        let signalled = async move {
            let reason = rx
                .wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|r| r.clone());
            match reason {
                Some(reason) => reason,
                None => std::future::pending().await,
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                reason = signalled => reason,
                _ = tokio::time::sleep_until(deadline) => CancellationReason::Timeout,
            },
            None => signalled.await,
        }
    }
}
