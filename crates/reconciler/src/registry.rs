//! Kind registry: which reconciler handles which kind.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use itertools::Itertools;
use tether_core::{Error, ObjectKey, Result};

use crate::reconciler::Reconciler;
use crate::shutdown::ShutdownSignal;
use crate::types::{DesiredSpec, ReconcileOutcome, StatusPayload};

/// A reconciler with its spec and payload types erased, so reconcilers of
/// different kinds can share one controller.
#[async_trait]
pub trait KindReconciler: Send + Sync {
    fn kind(&self) -> &str;

    async fn reconcile_one(&self, key: &ObjectKey, shutdown: &ShutdownSignal) -> ReconcileOutcome;
}

#[async_trait]
impl<S: DesiredSpec, P: StatusPayload> KindReconciler for Reconciler<S, P> {
    fn kind(&self) -> &str {
        self.definition().kind()
    }

    async fn reconcile_one(&self, key: &ObjectKey, shutdown: &ShutdownSignal) -> ReconcileOutcome {
        Self::reconcile_one(self, key, shutdown).await
    }
}

/// Reconcilers by kind.
#[derive(Clone, Default)]
pub struct Registry {
    kinds: HashMap<String, Arc<dyn KindReconciler>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reconciler under its own kind.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the kind is already registered.
    pub fn register(&mut self, reconciler: Arc<dyn KindReconciler>) -> Result<()> {
        let kind = reconciler.kind().to_string();
        if self.kinds.contains_key(&kind) {
            return Err(Error::invalid_config(format!(
                "kind '{kind}' is already registered"
            )));
        }
        self.kinds.insert(kind, reconciler);
        Ok(())
    }

    /// Builder-style [`Registry::register`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the kind is already registered.
    pub fn with(mut self, reconciler: Arc<dyn KindReconciler>) -> Result<Self> {
        self.register(reconciler)?;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `UnknownKind` if nothing is registered for `kind`.
    pub fn get(&self, kind: &str) -> Result<Arc<dyn KindReconciler>> {
        self.kinds
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::unknown_kind(kind))
    }

    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        self.kinds.keys().map(String::as_str).sorted().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;
    use std::time::Duration;

    struct FixedOutcome {
        kind: &'static str,
    }

    #[async_trait]
    impl KindReconciler for FixedOutcome {
        fn kind(&self) -> &str {
            self.kind
        }

        async fn reconcile_one(&self, _key: &ObjectKey, _shutdown: &ShutdownSignal) -> ReconcileOutcome {
            ReconcileOutcome::RequeueAfter(Duration::from_secs(1))
        }
    }

    #[test]
    fn test_duplicate_kind_is_rejected() {
        let registry = Registry::new().with(Arc::new(FixedOutcome { kind: "Network" }));
        let registry = registry.and_then(|r| r.with(Arc::new(FixedOutcome { kind: "Network" })));
        assert!(matches!(registry, Err(Error::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_lookup_by_kind() {
        let registry = Registry::new()
            .with(Arc::new(FixedOutcome { kind: "Network" }))
            .and_then(|r| r.with(Arc::new(FixedOutcome { kind: "App" })))
            .expect("distinct kinds register");

        assert_eq!(registry.kinds(), vec!["App", "Network"]);
        assert!(matches!(registry.get("Volume"), Err(Error::UnknownKind { .. })));

        let outcome = match registry.get("Network") {
            Ok(reconciler) => Some(
                reconciler
                    .reconcile_one(&ObjectKey::new("default", "n"), &ShutdownSignal::never())
                    .await,
            ),
            Err(_) => None,
        };
        assert_eq!(
            outcome.and_then(|o| o.requeue_after()),
            Some(Duration::from_secs(1))
        );
    }
}
