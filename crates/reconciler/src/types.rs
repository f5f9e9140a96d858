//! Core types for the reconciler: adapter result algebra and pass outcomes.

use std::fmt;
use std::time::Duration;

use tether_core::{AdapterError, Error};

/// Bounds every desired specification must satisfy.
pub trait DesiredSpec: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> DesiredSpec for T where T: Clone + fmt::Debug + Send + Sync + 'static {}

/// Bounds every adapter status payload must satisfy.
pub trait StatusPayload: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

impl<T> StatusPayload for T where T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

/// Result of a create or update call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    Succeeded,
    AwaitingVerification,
    Error,
}

impl ApplyResult {
    #[must_use]
    pub const fn succeeded(self) -> bool {
        matches!(self, Self::Succeeded)
    }

    #[must_use]
    pub const fn awaiting_verification(self) -> bool {
        matches!(self, Self::AwaitingVerification)
    }

    #[must_use]
    pub const fn failed(self) -> bool {
        matches!(self, Self::Error)
    }
}

impl fmt::Display for ApplyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "Succeeded"),
            Self::AwaitingVerification => write!(f, "AwaitingVerification"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Result of a verify call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyResult {
    Missing,
    RecreateRequired,
    UpdateRequired,
    Provisioning,
    Deleting,
    Ready,
    Error,
}

impl VerifyResult {
    #[must_use]
    pub const fn error(self) -> bool {
        matches!(self, Self::Error)
    }

    #[must_use]
    pub const fn missing(self) -> bool {
        matches!(self, Self::Missing)
    }

    #[must_use]
    pub const fn recreate_required(self) -> bool {
        matches!(self, Self::RecreateRequired)
    }

    #[must_use]
    pub const fn update_required(self) -> bool {
        matches!(self, Self::UpdateRequired)
    }

    #[must_use]
    pub const fn provisioning(self) -> bool {
        matches!(self, Self::Provisioning)
    }

    #[must_use]
    pub const fn deleting(self) -> bool {
        matches!(self, Self::Deleting)
    }

    #[must_use]
    pub const fn ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// The backend resource exists in some form.
    #[must_use]
    pub const fn exists(self) -> bool {
        !self.error() && !self.missing()
    }
}

impl fmt::Display for VerifyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Missing => "Missing",
            Self::RecreateRequired => "RecreateRequired",
            Self::UpdateRequired => "UpdateRequired",
            Self::Provisioning => "Provisioning",
            Self::Deleting => "Deleting",
            Self::Ready => "Ready",
            Self::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Result of a delete call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteResult {
    AlreadyDeleted,
    Succeeded,
    AwaitingVerification,
    Error,
}

impl DeleteResult {
    #[must_use]
    pub const fn error(self) -> bool {
        matches!(self, Self::Error)
    }

    #[must_use]
    pub const fn already_deleted(self) -> bool {
        matches!(self, Self::AlreadyDeleted)
    }

    #[must_use]
    pub const fn succeeded(self) -> bool {
        matches!(self, Self::Succeeded)
    }

    #[must_use]
    pub const fn awaiting_verification(self) -> bool {
        matches!(self, Self::AwaitingVerification)
    }

    /// Deletion is confirmed; the finalizer may go.
    #[must_use]
    pub const fn confirmed(self) -> bool {
        self.succeeded() || self.already_deleted()
    }
}

impl fmt::Display for DeleteResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyDeleted => write!(f, "AlreadyDeleted"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::AwaitingVerification => write!(f, "AwaitingVerification"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Outcome of a create or update call, with the status payload if the
/// adapter returned one.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyResponse<P> {
    Succeeded(Option<P>),
    AwaitingVerification(Option<P>),
    Error(AdapterError),
}

impl<P> ApplyResponse<P> {
    #[must_use]
    pub const fn succeeded() -> Self {
        Self::Succeeded(None)
    }

    #[must_use]
    pub const fn succeeded_with_status(payload: P) -> Self {
        Self::Succeeded(Some(payload))
    }

    #[must_use]
    pub const fn awaiting_verification() -> Self {
        Self::AwaitingVerification(None)
    }

    #[must_use]
    pub const fn awaiting_verification_with_status(payload: P) -> Self {
        Self::AwaitingVerification(Some(payload))
    }

    /// The plain result tag.
    #[must_use]
    pub const fn result(&self) -> ApplyResult {
        match self {
            Self::Succeeded(_) => ApplyResult::Succeeded,
            Self::AwaitingVerification(_) => ApplyResult::AwaitingVerification,
            Self::Error(_) => ApplyResult::Error,
        }
    }

    #[must_use]
    pub const fn payload(&self) -> Option<&P> {
        match self {
            Self::Succeeded(p) | Self::AwaitingVerification(p) => p.as_ref(),
            Self::Error(_) => None,
        }
    }
}

impl<P> From<AdapterError> for ApplyResponse<P> {
    fn from(err: AdapterError) -> Self {
        Self::Error(err)
    }
}

impl<P> From<Result<ApplyResponse<P>, AdapterError>> for ApplyResponse<P> {
    fn from(result: Result<ApplyResponse<P>, AdapterError>) -> Self {
        result.unwrap_or_else(Self::Error)
    }
}

/// Outcome of a verify call.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyResponse<P> {
    Missing,
    RecreateRequired,
    UpdateRequired,
    Provisioning(Option<P>),
    Deleting(Option<P>),
    Ready(Option<P>),
    Error(AdapterError),
}

impl<P> VerifyResponse<P> {
    #[must_use]
    pub const fn ready() -> Self {
        Self::Ready(None)
    }

    #[must_use]
    pub const fn ready_with_status(payload: P) -> Self {
        Self::Ready(Some(payload))
    }

    #[must_use]
    pub const fn provisioning() -> Self {
        Self::Provisioning(None)
    }

    #[must_use]
    pub const fn deleting() -> Self {
        Self::Deleting(None)
    }

    /// The plain result tag.
    #[must_use]
    pub const fn result(&self) -> VerifyResult {
        match self {
            Self::Missing => VerifyResult::Missing,
            Self::RecreateRequired => VerifyResult::RecreateRequired,
            Self::UpdateRequired => VerifyResult::UpdateRequired,
            Self::Provisioning(_) => VerifyResult::Provisioning,
            Self::Deleting(_) => VerifyResult::Deleting,
            Self::Ready(_) => VerifyResult::Ready,
            Self::Error(_) => VerifyResult::Error,
        }
    }

    #[must_use]
    pub const fn exists(&self) -> bool {
        self.result().exists()
    }

    #[must_use]
    pub const fn payload(&self) -> Option<&P> {
        match self {
            Self::Provisioning(p) | Self::Deleting(p) | Self::Ready(p) => p.as_ref(),
            Self::Missing | Self::RecreateRequired | Self::UpdateRequired | Self::Error(_) => None,
        }
    }

    /// A backend not-found error means the resource is missing, not that
    /// verification failed.
    #[must_use]
    pub fn not_found_as_missing(self) -> Self {
        match self {
            Self::Error(err) if err.is_not_found() => Self::Missing,
            other => other,
        }
    }
}

impl<P> From<AdapterError> for VerifyResponse<P> {
    fn from(err: AdapterError) -> Self {
        Self::Error(err)
    }
}

impl<P> From<Result<VerifyResponse<P>, AdapterError>> for VerifyResponse<P> {
    fn from(result: Result<VerifyResponse<P>, AdapterError>) -> Self {
        result.unwrap_or_else(Self::Error)
    }
}

/// Outcome of a delete call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteResponse {
    AlreadyDeleted,
    Succeeded,
    AwaitingVerification,
    Error(AdapterError),
}

impl DeleteResponse {
    /// The plain result tag.
    #[must_use]
    pub const fn result(&self) -> DeleteResult {
        match self {
            Self::AlreadyDeleted => DeleteResult::AlreadyDeleted,
            Self::Succeeded => DeleteResult::Succeeded,
            Self::AwaitingVerification => DeleteResult::AwaitingVerification,
            Self::Error(_) => DeleteResult::Error,
        }
    }

    /// Treat a backend NotFound as the resource already being gone.
    #[must_use]
    pub fn not_found_as_already_deleted(self) -> Self {
        match self {
            Self::Error(err) if err.is_not_found() => Self::AlreadyDeleted,
            other => other,
        }
    }
}

impl From<AdapterError> for DeleteResponse {
    fn from(err: AdapterError) -> Self {
        // A resource the backend cannot find is already gone.
        if err.is_not_found() {
            Self::AlreadyDeleted
        } else {
            Self::Error(err)
        }
    }
}

impl From<Result<DeleteResponse, AdapterError>> for DeleteResponse {
    fn from(result: Result<DeleteResponse, AdapterError>) -> Self {
        result.unwrap_or_else(Self::from)
    }
}

/// Outcome of one `reconcile_one` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing left to do until the next notification.
    Done,
    /// Run another pass after the delay.
    RequeueAfter(Duration),
    /// The pass failed. Retryable failures carry a requeue delay.
    Failed {
        error: Error,
        requeue_after: Option<Duration>,
    },
}

impl ReconcileOutcome {
    /// Delay before the next pass, if one should be scheduled.
    #[must_use]
    pub const fn requeue_after(&self) -> Option<Duration> {
        match self {
            Self::Done => None,
            Self::RequeueAfter(delay) => Some(*delay),
            Self::Failed { requeue_after, .. } => *requeue_after,
        }
    }

    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        match self {
            Self::Failed { error, .. } => Some(error),
            Self::Done | Self::RequeueAfter(_) => None,
        }
    }
}
