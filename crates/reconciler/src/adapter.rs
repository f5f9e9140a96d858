//! Resource-kind adapter: the only code that talks to a managed backend.

use async_trait::async_trait;
use tether_core::{AdapterError, Operation, Record};

use crate::dependency::DependencySet;
use crate::types::{ApplyResponse, DeleteResponse, DesiredSpec, StatusPayload, VerifyResponse};

/// Everything an adapter sees for one call: the record and its resolved
/// dependencies.
#[derive(Debug)]
pub struct ResourceSpec<'a, S, P> {
    pub record: &'a Record<S, P>,
    pub dependencies: &'a DependencySet,
}

impl<S, P> Clone for ResourceSpec<'_, S, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, P> Copy for ResourceSpec<'_, S, P> {}

impl<'a, S, P> ResourceSpec<'a, S, P> {
    #[must_use]
    pub const fn new(record: &'a Record<S, P>, dependencies: &'a DependencySet) -> Self {
        Self {
            record,
            dependencies,
        }
    }

    /// Desired specification of the record.
    #[must_use]
    pub const fn spec(&self) -> &'a S {
        &self.record.spec
    }

    /// Last persisted payload, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&'a P> {
        self.record.status.as_ref().and_then(|s| s.payload.as_ref())
    }
}

/// Per-kind backend operations.
///
/// Adapters never see storage and never decide what to do next: they
/// report what happened and the engine picks the transition. Failures are
/// carried in the `Error` variant of each response, so any method may be
/// written as `Result<_, AdapterError>` and converted with `.into()`.
#[async_trait]
pub trait ResourceAdapter<S, P>: Send + Sync
where
    S: DesiredSpec,
    P: StatusPayload,
{
    /// Create the backend resource.
    async fn create(&self, resource: ResourceSpec<'_, S, P>) -> ApplyResponse<P>;

    /// Bring an existing backend resource in line with the desired spec.
    ///
    /// Kinds without in-place updates keep the default.
    async fn update(&self, _resource: ResourceSpec<'_, S, P>) -> ApplyResponse<P> {
        ApplyResponse::Error(AdapterError::unsupported(Operation::Update))
    }

    /// Report how the backend resource compares with the desired spec.
    async fn verify(&self, resource: ResourceSpec<'_, S, P>) -> VerifyResponse<P>;

    /// Remove the backend resource.
    async fn delete(&self, resource: ResourceSpec<'_, S, P>) -> DeleteResponse;
}
