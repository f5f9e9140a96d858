//! Finalizer gate.
//!
//! A record carrying the gate's marker cannot be removed from storage. The
//! engine adds the marker before the first create and removes it only once
//! the backend has confirmed deletion.

use tether_core::Record;

/// Default finalizer name for a kind, e.g. `cluster.finalizers.tether.io`.
#[must_use]
pub fn default_finalizer(kind: &str) -> String {
    format!("{}.finalizers.tether.io", kind.to_lowercase())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizerGate {
    name: String,
}

impl FinalizerGate {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn has_finalizer<S, P>(&self, record: &Record<S, P>) -> bool {
        record.meta.has_finalizer(&self.name)
    }

    /// Returns `true` if the marker was added.
    pub fn add_finalizer<S, P>(&self, record: &mut Record<S, P>) -> bool {
        record.meta.add_finalizer(&self.name)
    }

    /// Returns `true` if the marker was removed.
    pub fn remove_finalizer<S, P>(&self, record: &mut Record<S, P>) -> bool {
        record.meta.remove_finalizer(&self.name)
    }
}
