/*!
 * Shutdown Coordinator
 *
 * Process-wide mapping of SIGINT/SIGTERM onto a watch channel. OS signal
 * delivery is global, so `install` registers handlers at most once and
 * hands every caller the same coordinator.
 */

use super::types::{ShutdownSignal, SignalError, SignalResult};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

static INSTALLED: Mutex<Option<Installed>> = parking_lot::const_mutex(None);

/// The process-wide coordinator and the task feeding it OS signals
struct Installed {
    coordinator: Arc<ShutdownCoordinator>,
    listener: JoinHandle<()>,
}

/// Delivers the first shutdown signal to any number of waiters
#[derive(Debug)]
pub struct ShutdownCoordinator {
    tx: watch::Sender<Option<ShutdownSignal>>,
}

impl ShutdownCoordinator {
    /// A coordinator not attached to OS signals; only `trigger` fires it
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Register SIGTERM and SIGINT handlers once per process
    ///
    /// Later calls return the same coordinator. Must run inside a Tokio
    /// runtime, which hosts the listener task. If that runtime has since
    /// shut down, the listener is re-registered on the caller's runtime and
    /// keeps feeding the same coordinator.
    pub fn install() -> SignalResult<Arc<Self>> {
        let mut slot = INSTALLED.lock();
        if let Some(installed) = slot.as_ref() {
            if !installed.listener.is_finished() {
                return Ok(Arc::clone(&installed.coordinator));
            }
        }

        tokio::runtime::Handle::try_current().map_err(|_| SignalError::NoRuntime)?;
        let coordinator = match slot.as_ref() {
            Some(installed) => {
                warn!("Signal listener runtime is gone, re-registering handlers");
                Arc::clone(&installed.coordinator)
            }
            None => Arc::new(Self::new()),
        };
        let listener = spawn_listener(Arc::clone(&coordinator))?;

        info!("Shutdown signal handlers installed (SIGTERM, SIGINT)");
        *slot = Some(Installed {
            coordinator: Arc::clone(&coordinator),
            listener,
        });
        Ok(coordinator)
    }

    /// Record `signal` as the shutdown cause
    ///
    /// Returns `false` if a shutdown was already triggered; the first signal
    /// is kept.
    pub fn trigger(&self, signal: ShutdownSignal) -> bool {
        let first = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(signal);
            true
        });
        if first {
            info!(%signal, "Shutdown requested");
        }
        first
    }

    pub fn received(&self) -> Option<ShutdownSignal> {
        *self.tx.borrow()
    }

    pub fn is_triggered(&self) -> bool {
        self.received().is_some()
    }

    /// Wait for the first shutdown signal
    pub async fn wait(&self) -> ShutdownSignal {
        let mut rx = self.tx.subscribe();
        let received = rx.wait_for(Option::is_some).await.ok().and_then(|s| *s);
        match received {
            Some(signal) => signal,
            // The sender lives in `self`, so the channel cannot close here
            None => std::future::pending().await,
        }
    }

    /// Run `routine` once the first shutdown signal arrives
    pub fn on_shutdown<F, Fut>(self: &Arc<Self>, routine: F) -> JoinHandle<()>
    where
        F: FnOnce(ShutdownSignal) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let signal = coordinator.wait().await;
            routine(signal).await;
        })
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward OS signals into `coordinator` from a task on the current runtime
fn spawn_listener(coordinator: Arc<ShutdownCoordinator>) -> SignalResult<JoinHandle<()>> {
    let mut terminate = register(ShutdownSignal::Terminate)?;
    let mut interrupt = register(ShutdownSignal::Interrupt)?;

    Ok(tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = terminate.recv() => ShutdownSignal::Terminate,
                Some(()) = interrupt.recv() => ShutdownSignal::Interrupt,
                else => break,
            };
            if !coordinator.trigger(received) {
                warn!(signal = %received, "Shutdown already in progress, ignoring signal");
            }
        }
    }))
}

fn register(which: ShutdownSignal) -> SignalResult<Signal> {
    let kind = match which {
        ShutdownSignal::Interrupt => SignalKind::interrupt(),
        ShutdownSignal::Terminate => SignalKind::terminate(),
    };
    signal(kind).map_err(|e| SignalError::RegistrationFailed {
        signal: which,
        reason: e.to_string(),
    })
}
