//! Status accessors: read and write the status embedded in a record.

use tether_core::{Error, Record, Result, Status};

/// Reads and writes the provisioning state and payload of a record.
///
/// Accessors touch only the in-memory record; persisting it is the
/// engine's job.
pub trait StatusAccessor<S, P>: Send + Sync {
    /// Current status. A record that was never reconciled yields the
    /// zero-value status rather than an error.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the record is not of the expected kind.
    fn get_status(&self, record: &Record<S, P>) -> Result<Status<P>>;

    /// Write `status` into the record. An absent payload keeps the stored
    /// payload.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the record is not of the expected kind.
    fn set_status(&self, record: &mut Record<S, P>, status: Status<P>) -> Result<()>;
}

/// Accessor for records that keep their status in `Record::status`.
#[derive(Debug, Clone)]
pub struct EmbeddedStatus {
    kind: String,
}

impl EmbeddedStatus {
    /// Accessor for records of `kind`.
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }

    fn check_kind<S, P>(&self, record: &Record<S, P>) -> Result<()> {
        if record.kind() == self.kind {
            Ok(())
        } else {
            Err(Error::type_mismatch(
                record.key().to_string(),
                &self.kind,
                record.kind(),
            ))
        }
    }
}

impl<S, P> StatusAccessor<S, P> for EmbeddedStatus
where
    S: Send + Sync,
    P: Clone + Send + Sync,
{
    fn get_status(&self, record: &Record<S, P>) -> Result<Status<P>> {
        self.check_kind(record)?;
        Ok(record.status.clone().unwrap_or_default())
    }

    fn set_status(&self, record: &mut Record<S, P>, status: Status<P>) -> Result<()> {
        self.check_kind(record)?;
        match record.status.as_mut() {
            Some(stored) => stored.merge(status),
            None => record.status = Some(status),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::{ObjectKey, ProvisionState};

    fn record(kind: &str) -> Record<(), String> {
        Record::new(kind, ObjectKey::new("default", "c1"), ())
    }

    #[test]
    fn test_unreconciled_record_has_zero_status() {
        let accessor = EmbeddedStatus::new("Cluster");
        let status = accessor.get_status(&record("Cluster"));
        assert_eq!(status.ok(), Some(Status::default()));
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let accessor = EmbeddedStatus::new("Cluster");
        let mut wrong = record("Job");

        assert!(matches!(
            accessor.get_status(&wrong),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            accessor.set_status(&mut wrong, Status::new(ProvisionState::Ready)),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(wrong.status.is_none());
    }

    #[test]
    fn test_payload_is_sticky() {
        let accessor = EmbeddedStatus::new("Cluster");
        let mut rec = record("Cluster");

        let first = Status::new(ProvisionState::AwaitingVerification).with_payload("id-1".to_string());
        assert!(accessor.set_status(&mut rec, first).is_ok());
        assert!(accessor.set_status(&mut rec, Status::new(ProvisionState::Ready)).is_ok());

        let status = accessor.get_status(&rec).ok();
        assert_eq!(status.as_ref().map(|s| s.state), Some(ProvisionState::Ready));
        assert_eq!(
            status.and_then(|s| s.payload),
            Some("id-1".to_string())
        );
    }
}
