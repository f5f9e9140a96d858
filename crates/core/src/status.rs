//! Provisioning state and status payload.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Provisioning state of a record, as persisted in its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProvisionState {
    /// Never reconciled, or the backend resource vanished.
    #[default]
    Uninitialized,
    /// The backend resource must be (re)created.
    Provisioning,
    /// The backend accepted a request but has not confirmed it.
    AwaitingVerification,
    Ready,
    /// A delete was accepted and is awaiting confirmation.
    Deleting,
}

impl ProvisionState {
    /// Whether a backend resource is expected to exist in this state.
    #[must_use]
    pub const fn implies_exists(self) -> bool {
        !matches!(self, Self::Uninitialized)
    }

    /// Whether the resource is ready for consumption.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Provisioning => "Provisioning",
            Self::AwaitingVerification => "AwaitingVerification",
            Self::Ready => "Ready",
            Self::Deleting => "Deleting",
        }
    }
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status sub-record: state plus opaque adapter payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status<P> {
    pub state: ProvisionState,
    #[serde(default)]
    pub payload: Option<P>,
}

impl<P> Default for Status<P> {
    fn default() -> Self {
        Self {
            state: ProvisionState::Uninitialized,
            payload: None,
        }
    }
}

impl<P> Status<P> {
    /// Status with a state and no payload.
    #[must_use]
    pub const fn new(state: ProvisionState) -> Self {
        Self {
            state,
            payload: None,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: P) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attach an optional payload.
    #[must_use]
    pub fn with_optional_payload(mut self, payload: Option<P>) -> Self {
        self.payload = payload;
        self
    }

    /// Apply an update with sticky payload semantics: an absent incoming
    /// payload keeps the stored one.
    pub fn merge(&mut self, incoming: Self) {
        self.state = incoming.state;
        if let Some(payload) = incoming.payload {
            self.payload = Some(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_uninitialized() {
        let status: Status<String> = Status::default();
        assert_eq!(status.state, ProvisionState::Uninitialized);
        assert!(status.payload.is_none());
    }

    #[test]
    fn test_merge_keeps_payload_when_absent() {
        let mut stored = Status::new(ProvisionState::AwaitingVerification).with_payload(7u32);
        stored.merge(Status::new(ProvisionState::Ready));
        assert_eq!(stored.state, ProvisionState::Ready);
        assert_eq!(stored.payload, Some(7));
    }

    #[test]
    fn test_merge_overwrites_payload_when_present() {
        let mut stored = Status::new(ProvisionState::Ready).with_payload(7u32);
        stored.merge(Status::new(ProvisionState::Ready).with_payload(9));
        assert_eq!(stored.payload, Some(9));
    }

    #[test]
    fn test_implies_exists() {
        assert!(!ProvisionState::Uninitialized.implies_exists());
        assert!(ProvisionState::Deleting.implies_exists());
        assert!(ProvisionState::AwaitingVerification.implies_exists());
    }
}
