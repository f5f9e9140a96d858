//! Dependency resolution.
//!
//! A record may declare references to records of other kinds. Before any
//! mutating adapter call the engine resolves those references into a
//! [`DependencySet`] and defers the pass unless every dependency is Ready.
//! Payloads cross kinds as JSON so no kind needs the others' types.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tether_core::{Error, ObjectKey, ProvisionState, Record, Result};

/// Reference from one record to another, by kind and key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyRef {
    pub kind: String,
    pub key: ObjectKey,
}

impl DependencyRef {
    pub fn new(kind: impl Into<String>, key: ObjectKey) -> Self {
        Self {
            kind: kind.into(),
            key,
        }
    }
}

impl fmt::Display for DependencyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key)
    }
}

/// What the engine needs to know about a resolved dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub reference: DependencyRef,
    pub state: ProvisionState,
    pub deletion_requested: bool,
    /// Status payload of the dependency, if it has one.
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

impl DependencyRecord {
    /// Snapshot a record of another kind.
    ///
    /// # Errors
    ///
    /// Returns `Resolution` if the payload cannot be serialized.
    pub fn from_record<S, P: Serialize>(record: &Record<S, P>) -> Result<Self> {
        let (state, payload) = match record.status.as_ref() {
            Some(status) => (status.state, status.payload.as_ref()),
            None => (ProvisionState::Uninitialized, None),
        };
        let payload = payload
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| Error::resolution(record.key().to_string(), e.to_string()))?;

        Ok(Self {
            reference: DependencyRef::new(record.kind(), record.key().clone()),
            state,
            deletion_requested: record.is_deletion_requested(),
            payload,
        })
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    /// Decode the payload into the dependency kind's payload type.
    ///
    /// # Errors
    ///
    /// Returns `Resolution` if there is no payload or it does not decode.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        let key = self.reference.to_string();
        let value = self
            .payload
            .clone()
            .ok_or_else(|| Error::resolution(&key, "dependency has no status payload"))?;
        serde_json::from_value(value).map_err(|e| Error::resolution(key, e.to_string()))
    }
}

/// Resolved dependencies of one record, keyed by reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencySet {
    records: BTreeMap<DependencyRef, DependencyRecord>,
}

impl DependencySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: DependencyRecord) {
        self.records.insert(record.reference.clone(), record);
    }

    #[must_use]
    pub fn get(&self, reference: &DependencyRef) -> Option<&DependencyRecord> {
        self.records.get(reference)
    }

    /// First dependency of `kind`, for kinds that reference exactly one.
    #[must_use]
    pub fn first_of_kind(&self, kind: &str) -> Option<&DependencyRecord> {
        self.records.values().find(|d| d.reference.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DependencyRecord> {
        self.records.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// References of dependencies that are not Ready.
    #[must_use]
    pub fn not_ready(&self) -> Vec<&DependencyRef> {
        self.records
            .values()
            .filter(|d| !d.is_ready())
            .map(|d| &d.reference)
            .collect()
    }

    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.records.values().all(DependencyRecord::is_ready)
    }

    /// Comma-separated list of dependencies that are not Ready.
    #[must_use]
    pub fn describe_not_ready(&self) -> String {
        self.not_ready().iter().join(", ")
    }
}

impl FromIterator<DependencyRecord> for DependencySet {
    fn from_iter<I: IntoIterator<Item = DependencyRecord>>(iter: I) -> Self {
        let mut set = Self::new();
        iter.into_iter().for_each(|record| set.insert(record));
        set
    }
}

/// How absent dependencies are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// An absent dependency is a `DependencyNotFound` error.
    Strict,
    /// Absent dependencies are left out of the set. Used while deleting.
    SkipMissing,
}

/// Resolves the dependencies of a record.
#[async_trait]
pub trait DependencyResolver<S, P>: Send + Sync {
    /// # Errors
    ///
    /// `DependencyNotFound` for an absent dependency in strict mode,
    /// `Resolution` for a reference that cannot be looked up at all. Lookup
    /// failures such as `StoreFailed` are returned as they are.
    async fn dependencies(&self, record: &Record<S, P>, mode: ResolveMode) -> Result<DependencySet>;
}

/// Resolver for kinds without dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDependencies;

#[async_trait]
impl<S, P> DependencyResolver<S, P> for NoDependencies
where
    S: Sync,
    P: Sync,
{
    async fn dependencies(&self, _record: &Record<S, P>, _mode: ResolveMode) -> Result<DependencySet> {
        Ok(DependencySet::new())
    }
}

/// Looks up records of one kind by key.
#[async_trait]
pub trait DependencyLookup: Send + Sync {
    /// `Ok(None)` if no such record exists.
    ///
    /// # Errors
    ///
    /// Any error other than absence, e.g. a storage failure.
    async fn lookup(&self, key: &ObjectKey) -> Result<Option<DependencyRecord>>;
}

/// Table of lookups by kind.
#[derive(Clone, Default)]
pub struct DependencyDirectory {
    lookups: HashMap<String, Arc<dyn DependencyLookup>>,
}

impl DependencyDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>, lookup: Arc<dyn DependencyLookup>) -> Self {
        self.lookups.insert(kind.into(), lookup);
        self
    }

    /// Resolve one reference.
    ///
    /// # Errors
    ///
    /// `Resolution` if no lookup is registered for the kind. Errors from the
    /// lookup itself pass through unchanged, so a storage failure stays
    /// retryable.
    pub async fn resolve(&self, reference: &DependencyRef) -> Result<Option<DependencyRecord>> {
        let lookup = self.lookups.get(&reference.kind).ok_or_else(|| {
            Error::resolution(
                reference.to_string(),
                format!("no lookup registered for kind '{}'", reference.kind),
            )
        })?;
        lookup.lookup(&reference.key).await
    }
}

impl fmt::Debug for DependencyDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyDirectory")
            .field("kinds", &self.lookups.keys().sorted().collect::<Vec<_>>())
            .finish()
    }
}

type ReferenceFn<S, P> = dyn Fn(&Record<S, P>) -> Result<Vec<DependencyRef>> + Send + Sync;

/// Resolver that reads references off the record and looks each one up in
/// a [`DependencyDirectory`].
pub struct ReferenceResolver<S, P> {
    directory: DependencyDirectory,
    references: Arc<ReferenceFn<S, P>>,
}

impl<S, P> ReferenceResolver<S, P> {
    pub fn new<F>(directory: DependencyDirectory, references: F) -> Self
    where
        F: Fn(&Record<S, P>) -> Result<Vec<DependencyRef>> + Send + Sync + 'static,
    {
        Self {
            directory,
            references: Arc::new(references),
        }
    }
}

#[async_trait]
impl<S, P> DependencyResolver<S, P> for ReferenceResolver<S, P>
where
    S: Sync,
    P: Sync,
{
    async fn dependencies(&self, record: &Record<S, P>, mode: ResolveMode) -> Result<DependencySet> {
        let references = (self.references)(record)?;
        let mut set = DependencySet::new();

        for reference in references.into_iter().unique() {
            match self.directory.resolve(&reference).await? {
                Some(found) => set.insert(found),
                None => match mode {
                    ResolveMode::Strict => {
                        return Err(Error::dependency_not_found(
                            reference.kind,
                            reference.key.to_string(),
                        ));
                    }
                    ResolveMode::SkipMissing => {}
                },
            }
        }

        Ok(set)
    }
}
