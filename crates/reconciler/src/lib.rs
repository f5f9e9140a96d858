//! Level-triggered reconciliation engine.
//!
//! This crate drives externally managed resources toward the state declared
//! in stored records, in the style of a Kubernetes controller:
//!
//! - **Records**: desired spec plus persisted status (see `tether-core`)
//! - **Adapters**: per-kind create, update, verify, and delete against a backend
//! - **Passes**: each pass reads the stored status, calls the adapter once,
//!   and persists the resulting state
//! - **Finalizers**: a record is not removed from storage until the backend
//!   has confirmed deletion
//!
//! # Key Concepts
//!
//! ## Provisioning states
//!
//! `Uninitialized → Provisioning → AwaitingVerification → Ready`, with
//! `Ready → Provisioning` when the backend asks for a recreate and
//! `Deleting` once deletion has been requested.
//!
//! ## Dependencies
//!
//! A record may reference records of other kinds. No mutating adapter call
//! happens until every dependency is Ready.
//!
//! ## Concurrency
//!
//! The [`ReconciliationLoop`] runs a pool of workers over a coalescing
//! [`WorkQueue`]: different records reconcile concurrently, the same record
//! never does.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_reconciler::{
//!     ControllerConfig, InMemoryRecordStore, Notification, Reconciler, ReconciliationLoop,
//!     Registry, ResourceDefinition,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(InMemoryRecordStore::<BucketSpec, BucketStatus>::new());
//!     let reconciler = Reconciler::builder(ResourceDefinition::new("Bucket"))
//!         .with_adapter(Arc::new(BucketAdapter::default()))
//!         .with_store(store.clone())
//!         .build()?;
//!
//!     let registry = Registry::new().with(Arc::new(reconciler))?;
//!     let controller = ReconciliationLoop::new(registry, ControllerConfig::default())?;
//!     let handle = controller.handle();
//!     tokio::spawn(controller.run());
//!
//!     handle.notify(Notification::new("Bucket", key)).await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod adapter;
pub mod backoff;
pub mod config;
pub mod definition;
pub mod dependency;
pub mod events;
pub mod finalizer;
pub mod r#loop;
pub mod queue;
pub mod reconciler;
pub mod registry;
pub mod shutdown;
pub mod status;
pub mod store;
pub mod types;

// Re-export main types
pub use adapter::{ResourceAdapter, ResourceSpec};
pub use backoff::{BackoffPolicy, BackoffTracker};
pub use config::{ControllerConfig, ReconcilerConfig};
pub use definition::ResourceDefinition;
pub use dependency::{
    DependencyDirectory, DependencyLookup, DependencyRecord, DependencyRef, DependencyResolver,
    DependencySet, NoDependencies, ReferenceResolver, ResolveMode,
};
pub use events::{
    EventRecorder, EventType, InMemoryEventRecorder, ReconcileEvent, TracingEventRecorder, reasons,
};
pub use finalizer::{FinalizerGate, default_finalizer};
pub use queue::WorkQueue;
pub use r#loop::{LoopHandle, LoopStopper, Notification, ReconciliationLoop, WorkItem};
pub use reconciler::{Reconciler, ReconcilerBuilder};
pub use registry::{KindReconciler, Registry};
pub use shutdown::{Shutdown, ShutdownReason, ShutdownSignal, install_signal_handlers};
pub use status::{EmbeddedStatus, StatusAccessor};
pub use store::{InMemoryRecordStore, RecordStore};
pub use types::{
    ApplyResponse, ApplyResult, DeleteResponse, DeleteResult, DesiredSpec, ReconcileOutcome,
    StatusPayload, VerifyResponse, VerifyResult,
};

pub use tether_core::{
    AdapterError, Error, ObjectKey, ObjectMeta, Operation, ProvisionState, Record, Result, Status,
};
