//! Reconciliation events: what happened to a record, for operators.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_core::ObjectKey;
use tokio::sync::RwLock;
use tracing::{info, warn};
use ulid::Ulid;

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Warning => write!(f, "Warning"),
        }
    }
}

/// Event reasons recorded by the engine.
pub mod reasons {
    pub const CREATED: &str = "Created";
    pub const UPDATED: &str = "Updated";
    pub const READY: &str = "Ready";
    pub const AWAITING_VERIFICATION: &str = "AwaitingVerification";
    pub const DEPENDENCIES_NOT_READY: &str = "DependenciesNotReady";
    pub const RECREATING: &str = "Recreating";
    pub const DELETING: &str = "Deleting";
    pub const DELETED: &str = "Deleted";
    pub const CREATE_FAILED: &str = "CreateFailed";
    pub const UPDATE_FAILED: &str = "UpdateFailed";
    pub const VERIFY_FAILED: &str = "VerifyFailed";
    pub const DELETE_FAILED: &str = "DeleteFailed";
    pub const RECONCILE_FAILED: &str = "ReconcileFailed";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileEvent {
    pub id: Ulid,
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub key: ObjectKey,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
}

impl ReconcileEvent {
    pub fn new(
        kind: impl Into<String>,
        key: ObjectKey,
        event_type: EventType,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Ulid::new(),
            timestamp: Utc::now(),
            kind: kind.into(),
            key,
            event_type,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn normal(
        kind: impl Into<String>,
        key: ObjectKey,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(kind, key, EventType::Normal, reason, message)
    }

    pub fn warning(
        kind: impl Into<String>,
        key: ObjectKey,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(kind, key, EventType::Warning, reason, message)
    }
}

/// Sink for reconciliation events. Recording never fails a pass.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, event: ReconcileEvent);
}

/// Writes events to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventRecorder;

#[async_trait]
impl EventRecorder for TracingEventRecorder {
    async fn record(&self, event: ReconcileEvent) {
        match event.event_type {
            EventType::Normal => info!(
                kind = %event.kind,
                key = %event.key,
                reason = %event.reason,
                "{}",
                event.message
            ),
            EventType::Warning => warn!(
                kind = %event.kind,
                key = %event.key,
                reason = %event.reason,
                "{}",
                event.message
            ),
        }
    }
}

/// Keeps events in memory, for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventRecorder {
    events: Arc<RwLock<Vec<ReconcileEvent>>>,
}

impl InMemoryEventRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<ReconcileEvent> {
        self.events.read().await.clone()
    }

    /// Reasons recorded for `key`, oldest first.
    pub async fn reasons_for(&self, key: &ObjectKey) -> Vec<String> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| &e.key == key)
            .map(|e| e.reason.clone())
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.events.read().await.len()
    }
}

#[async_trait]
impl EventRecorder for InMemoryEventRecorder {
    async fn record(&self, event: ReconcileEvent) {
        self.events.write().await.push(event);
    }
}
