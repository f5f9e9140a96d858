//! Per-kind resource definition: kind name, status accessor and finalizer.

use std::fmt;
use std::sync::Arc;

use tether_core::{ObjectKey, Record};

use crate::finalizer::{FinalizerGate, default_finalizer};
use crate::status::{EmbeddedStatus, StatusAccessor};
use crate::types::{DesiredSpec, StatusPayload};

pub struct ResourceDefinition<S, P> {
    kind: String,
    finalizer: FinalizerGate,
    accessor: Arc<dyn StatusAccessor<S, P>>,
}

impl<S, P> Clone for ResourceDefinition<S, P> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            finalizer: self.finalizer.clone(),
            accessor: Arc::clone(&self.accessor),
        }
    }
}

impl<S, P> fmt::Debug for ResourceDefinition<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDefinition")
            .field("kind", &self.kind)
            .field("finalizer", &self.finalizer.name())
            .finish_non_exhaustive()
    }
}

impl<S, P> ResourceDefinition<S, P>
where
    S: DesiredSpec,
    P: StatusPayload,
{
    /// Definition with the embedded status accessor and the default
    /// finalizer name for `kind`.
    pub fn new(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        Self {
            finalizer: FinalizerGate::new(default_finalizer(&kind)),
            accessor: Arc::new(EmbeddedStatus::new(kind.clone())),
            kind,
        }
    }

    #[must_use]
    pub fn with_finalizer(mut self, name: impl Into<String>) -> Self {
        self.finalizer = FinalizerGate::new(name);
        self
    }

    #[must_use]
    pub fn with_accessor(mut self, accessor: Arc<dyn StatusAccessor<S, P>>) -> Self {
        self.accessor = accessor;
        self
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub const fn finalizer_gate(&self) -> &FinalizerGate {
        &self.finalizer
    }

    #[must_use]
    pub fn accessor(&self) -> &dyn StatusAccessor<S, P> {
        self.accessor.as_ref()
    }

    /// A fresh, never-reconciled record of this kind.
    pub fn new_record(&self, key: ObjectKey, spec: S) -> Record<S, P> {
        Record::new(self.kind.clone(), key, spec)
    }
}
