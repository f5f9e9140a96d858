//! Shutdown signalling.
//!
//! One [`Shutdown`] handle triggers; any number of [`ShutdownSignal`]s
//! observe. Passes race adapter calls against the signal so that a shutdown
//! aborts in-flight backend work without touching persisted status.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

/// Why shutdown was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGTERM received
    Sigterm,
    /// SIGINT received (Ctrl+C)
    Sigint,
    /// Requested through [`Shutdown::trigger`]
    Programmatic,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sigterm => write!(f, "SIGTERM"),
            Self::Sigint => write!(f, "SIGINT"),
            Self::Programmatic => write!(f, "PROGRAMMATIC"),
        }
    }
}

/// Trigger side. Cloning shares the same underlying channel.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// A new observer.
    #[must_use]
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger a programmatic shutdown.
    pub fn trigger(&self) {
        self.trigger_with(ShutdownReason::Programmatic);
    }

    /// Trigger shutdown. Only the first reason is kept.
    pub fn trigger_with(&self, reason: ShutdownReason) {
        let changed = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if changed {
            info!(reason = %reason, "Shutdown initiated");
        }
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.tx.borrow().is_some()
    }

    #[must_use]
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.tx.borrow()
    }
}

/// Observer side.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<Option<ShutdownReason>>,
}

impl ShutdownSignal {
    /// A signal that never fires, for one-off passes outside a controller.
    #[must_use]
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(None);
        drop(tx);
        Self { rx }
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Resolve once shutdown is triggered. Pends forever if the trigger
    /// side was dropped without firing.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(Option::is_some).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Install OS signal handlers (SIGTERM, SIGINT) that trigger `shutdown`.
pub fn install_signal_handlers(shutdown: Shutdown) -> tokio::task::JoinHandle<()> {
    info!("Installing OS signal handlers");

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    return;
                }
            };

            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "Failed to install SIGINT handler");
                    return;
                }
            };

            tokio::select! {
                _ = sigterm.recv() => shutdown.trigger_with(ShutdownReason::Sigterm),
                _ = sigint.recv() => shutdown.trigger_with(ShutdownReason::Sigint),
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
                return;
            }
            shutdown.trigger_with(ShutdownReason::Sigint);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_observes_trigger() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.signal();
        assert!(!signal.is_shutdown());

        shutdown.trigger();
        assert!(signal.is_shutdown());
        let waited = tokio::time::timeout(Duration::from_secs(1), signal.cancelled()).await;
        assert!(waited.is_ok());
    }

    #[tokio::test]
    async fn test_first_reason_wins() {
        let shutdown = Shutdown::new();
        shutdown.trigger_with(ShutdownReason::Sigterm);
        shutdown.trigger();
        assert_eq!(shutdown.reason(), Some(ShutdownReason::Sigterm));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let shutdown = Shutdown::new();
        let signal = shutdown.signal();
        shutdown.clone().trigger();
        assert!(shutdown.is_triggered());
        assert!(signal.is_shutdown());
    }

    #[tokio::test]
    async fn test_never_does_not_fire() {
        let mut signal = ShutdownSignal::never();
        assert!(!signal.is_shutdown());
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(waited.is_err());
    }
}
