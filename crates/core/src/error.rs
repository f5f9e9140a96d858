//! Core error types for tether operations.
//!
//! Two layers: [`AdapterError`] describes what went wrong at the managed
//! backend, [`Error`] is the engine-level taxonomy. Every per-record failure
//! is classified as retryable or terminal; none of them is fatal to the
//! process.

use std::fmt;

use thiserror::Error;

/// Result type alias for tether operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The four adapter operations, used to tag errors and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Verify,
    Delete,
}

impl Operation {
    /// Lower-case name of the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Verify => "verify",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a resource-kind adapter talking to its backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// Network failure, throttling, 5xx-equivalent.
    #[error("transient backend error: {reason}")]
    Transient { reason: String },

    /// The backend has no such resource.
    #[error("resource not found in backend: {reason}")]
    NotFound { reason: String },

    /// The kind does not implement this operation.
    #[error("operation '{operation}' is not supported by this adapter")]
    Unsupported { operation: Operation },

    /// The backend refused the request (validation, quota, permissions).
    #[error("backend rejected request: {reason}")]
    Rejected { reason: String },

    /// The call exceeded its deadline.
    #[error("adapter call timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
}

impl AdapterError {
    /// Create a transient error.
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound {
            reason: reason.into(),
        }
    }

    /// Create an unsupported-operation error.
    #[must_use]
    pub const fn unsupported(operation: Operation) -> Self {
        Self::Unsupported { operation }
    }

    /// Create a rejected error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Whether a retry can succeed without anything changing on our side.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::TimedOut { .. })
    }

    /// Whether the backend reported the resource as absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Engine-level error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The record is not of the kind the accessor expects.
    #[error("record '{key}' has kind '{actual}', expected '{expected}'")]
    TypeMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    /// A dependency reference could not be resolved at all.
    #[error("dependency resolution failed for '{key}': {reason}")]
    Resolution { key: String, reason: String },

    /// A referenced dependency does not exist (yet).
    #[error("dependency {kind} '{key}' not found")]
    DependencyNotFound { kind: String, key: String },

    /// Optimistic-concurrency check failed on update.
    #[error("conflict updating '{key}': expected version {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// The record is not in storage.
    #[error("record '{key}' not found")]
    RecordNotFound { key: String },

    /// Storage backend failure other than a conflict.
    #[error("store operation '{operation}' failed: {reason}")]
    StoreFailed { operation: String, reason: String },

    /// An adapter call failed.
    #[error("{operation} failed: {source}")]
    Adapter {
        operation: Operation,
        #[source]
        source: AdapterError,
    },

    /// No registration exists for the kind.
    #[error("unknown resource kind '{kind}'")]
    UnknownKind { kind: String },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The pass observed shutdown.
    #[error("reconciliation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a type mismatch error.
    pub fn type_mismatch(
        key: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            key: key.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a resolution error.
    pub fn resolution(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a dependency not found error.
    pub fn dependency_not_found(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self::DependencyNotFound {
            kind: kind.into(),
            key: key.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(key: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::Conflict {
            key: key.into(),
            expected,
            actual,
        }
    }

    /// Create a record not found error.
    pub fn record_not_found(key: impl Into<String>) -> Self {
        Self::RecordNotFound { key: key.into() }
    }

    /// Create a store failed error.
    pub fn store_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an adapter error.
    #[must_use]
    pub const fn adapter(operation: Operation, source: AdapterError) -> Self {
        Self::Adapter { operation, source }
    }

    /// Create an unknown kind error.
    pub fn unknown_kind(kind: impl Into<String>) -> Self {
        Self::UnknownKind { kind: kind.into() }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether the failed pass should be requeued with backoff.
    ///
    /// Programming and configuration errors are terminal: they recur on the
    /// next notification, but the engine does not busy-loop on them.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Adapter { .. }
            | Self::Conflict { .. }
            | Self::StoreFailed { .. }
            | Self::DependencyNotFound { .. } => true,
            Self::TypeMismatch { .. }
            | Self::Resolution { .. }
            | Self::RecordNotFound { .. }
            | Self::UnknownKind { .. }
            | Self::InvalidConfig { .. }
            | Self::Cancelled => false,
        }
    }

    /// Whether a retry may succeed with nothing changed on either side.
    ///
    /// True for every retryable error except an adapter error whose source
    /// is not transient, i.e. a backend refusal or an unsupported operation.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Adapter { source, .. } => source.is_transient(),
            other => other.is_retryable(),
        }
    }

    /// Whether this is an optimistic-concurrency conflict.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
