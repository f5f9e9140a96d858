//! Desired-state records.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::status::Status;

/// Stable identity of a record: namespace plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    /// Create a namespaced key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a key without a namespace.
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self::new(String::new(), name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

impl FromStr for ObjectKey {
    type Err = Error;

    /// Parses `namespace/name` or a bare `name`.
    fn from_str(s: &str) -> Result<Self> {
        let parsed = match s.split_once('/') {
            Some((namespace, name)) => Self::new(namespace, name),
            None => Self::cluster_scoped(s),
        };
        if parsed.name.is_empty() || parsed.name.contains('/') {
            return Err(Error::resolution(s, "malformed object key"));
        }
        Ok(parsed)
    }
}

/// Metadata common to every record regardless of kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub key: ObjectKey,
    /// Resource kind, checked by the status accessor.
    pub kind: String,
    #[serde(default)]
    pub finalizers: Vec<String>,
    /// Set when deletion has been requested but finalizers are pending.
    #[serde(default)]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    /// Bumped by the store on every successful update.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Create metadata for a fresh record.
    pub fn new(kind: impl Into<String>, key: ObjectKey) -> Self {
        Self {
            key,
            kind: kind.into(),
            finalizers: Vec::new(),
            deletion_timestamp: None,
            resource_version: 0,
            annotations: BTreeMap::new(),
        }
    }

    /// Whether deletion has been requested.
    #[must_use]
    pub const fn is_deletion_requested(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Whether the named finalizer is present.
    #[must_use]
    pub fn has_finalizer(&self, name: &str) -> bool {
        self.finalizers.iter().any(|f| f == name)
    }

    /// Add a finalizer. Returns `false` if it was already present.
    pub fn add_finalizer(&mut self, name: &str) -> bool {
        if self.has_finalizer(name) {
            return false;
        }
        self.finalizers.push(name.to_string());
        true
    }

    /// Remove a finalizer. Returns `false` if it was not present.
    pub fn remove_finalizer(&mut self, name: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != name);
        self.finalizers.len() != before
    }
}

/// A desired-state record.
///
/// `S` is the adapter-specific desired specification and `P` the
/// adapter-defined status payload. Both are opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<S, P> {
    pub meta: ObjectMeta,
    pub spec: S,
    /// `None` until the first reconciliation pass writes it.
    #[serde(default)]
    pub status: Option<Status<P>>,
}

impl<S, P> Record<S, P> {
    /// Create a record that has never been reconciled.
    pub fn new(kind: impl Into<String>, key: ObjectKey, spec: S) -> Self {
        Self {
            meta: ObjectMeta::new(kind, key),
            spec,
            status: None,
        }
    }

    /// The record's identity.
    #[must_use]
    pub const fn key(&self) -> &ObjectKey {
        &self.meta.key
    }

    /// The record's kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.meta.kind
    }

    /// Whether deletion has been requested.
    #[must_use]
    pub const fn is_deletion_requested(&self) -> bool {
        self.meta.is_deletion_requested()
    }
}
