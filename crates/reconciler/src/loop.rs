//! Continuous reconciliation loop.
//!
//! Change notifications land in a [`WorkQueue`] keyed by kind and record.
//! A fixed pool of workers pulls keys off the queue, runs one pass through
//! the kind's reconciler, and schedules the requeue the pass asked for.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tether_core::{Error, ObjectKey, Result};
use tracing::{debug, error, info};

use crate::config::ControllerConfig;
use crate::queue::WorkQueue;
use crate::registry::Registry;
use crate::shutdown::{Shutdown, ShutdownSignal};

/// Unit of work: one record of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub kind: String,
    pub key: ObjectKey,
}

impl WorkItem {
    pub fn new(kind: impl Into<String>, key: ObjectKey) -> Self {
        Self {
            kind: kind.into(),
            key,
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key)
    }
}

/// A record of some kind may have changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: String,
    pub key: ObjectKey,
    /// Free-form origin of the change, for logs only.
    #[serde(default)]
    pub reason: Option<String>,
}

impl Notification {
    pub fn new(kind: impl Into<String>, key: ObjectKey) -> Self {
        Self {
            kind: kind.into(),
            key,
            reason: None,
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Continuous reconciliation loop.
///
/// Runs until its [`Shutdown`] is triggered, then lets in-flight passes
/// observe the signal and waits for every worker to exit.
pub struct ReconciliationLoop {
    registry: Arc<Registry>,
    queue: Arc<WorkQueue<WorkItem>>,
    config: ControllerConfig,
    shutdown: Shutdown,
}

impl ReconciliationLoop {
    /// Create a new reconciliation loop.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration does not validate or
    /// the registry is empty.
    pub fn new(registry: Registry, config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        if registry.is_empty() {
            return Err(Error::invalid_config("no resource kinds registered"));
        }
        Ok(Self {
            registry: Arc::new(registry),
            queue: Arc::new(WorkQueue::new()),
            config,
            shutdown: Shutdown::new(),
        })
    }

    /// Use an externally owned shutdown trigger, e.g. one wired to OS
    /// signals.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Handle for delivering notifications while the loop runs.
    #[must_use]
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            registry: Arc::clone(&self.registry),
            queue: Arc::clone(&self.queue),
        }
    }

    /// Get a stopper handle.
    #[must_use]
    pub fn stopper(&self) -> LoopStopper {
        LoopStopper {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Run the reconciliation loop until shutdown.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if a worker task panicked.
    pub async fn run(self) -> Result<()> {
        info!(
            workers = self.config.workers,
            kinds = ?self.registry.kinds(),
            "Starting reconciliation loop"
        );

        let workers: Vec<_> = (0..self.config.workers)
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    Arc::clone(&self.registry),
                    Arc::clone(&self.queue),
                    self.shutdown.signal(),
                ))
            })
            .collect();

        let mut signal = self.shutdown.signal();
        signal.cancelled().await;

        info!("Shutdown observed, draining workers");
        self.queue.shut_down().await;

        let panicked = join_all(workers)
            .await
            .into_iter()
            .filter_map(std::result::Result::err)
            .inspect(|e| error!(error = %e, "Worker task failed"))
            .count();

        info!("Reconciliation loop stopped");
        if panicked > 0 {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

async fn worker(
    id: usize,
    registry: Arc<Registry>,
    queue: Arc<WorkQueue<WorkItem>>,
    shutdown: ShutdownSignal,
) {
    debug!(worker = id, "Worker started");

    while let Some(item) = queue.get().await {
        match registry.get(&item.kind) {
            Ok(reconciler) => {
                let outcome = reconciler.reconcile_one(&item.key, &shutdown).await;
                if let Some(delay) = outcome.requeue_after() {
                    queue.add_after(item.clone(), delay);
                }
            }
            Err(e) => error!(error = %e, item = %item, "Dropping work item"),
        }
        queue.done(&item).await;
    }

    debug!(worker = id, "Worker stopped");
}

/// Delivers change notifications to a running loop.
#[derive(Clone)]
pub struct LoopHandle {
    registry: Arc<Registry>,
    queue: Arc<WorkQueue<WorkItem>>,
}

impl LoopHandle {
    /// Queue a pass for the notified record. Returns `false` if the record
    /// was already queued or the loop is shutting down.
    ///
    /// # Errors
    ///
    /// Returns `UnknownKind` if no reconciler handles the kind.
    pub async fn notify(&self, notification: Notification) -> Result<bool> {
        if !self.registry.contains(&notification.kind) {
            return Err(Error::unknown_kind(notification.kind));
        }
        debug!(
            kind = %notification.kind,
            key = %notification.key,
            reason = notification.reason.as_deref().unwrap_or("unspecified"),
            "Change notification"
        );
        Ok(self
            .queue
            .add(WorkItem::new(notification.kind, notification.key))
            .await)
    }

    /// Records waiting for a worker.
    pub async fn pending(&self) -> usize {
        self.queue.len().await
    }
}

/// Handle to stop a reconciliation loop.
#[derive(Clone)]
pub struct LoopStopper {
    shutdown: Shutdown,
}

impl LoopStopper {
    /// Stop the loop.
    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}
