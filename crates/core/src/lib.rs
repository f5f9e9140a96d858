//! Core types for the tether reconciliation engine.
//!
//! - **Records**: identity, metadata, desired spec, and status
//! - **Status**: provisioning state plus an opaque, adapter-defined payload
//! - **Errors**: the engine's failure taxonomy and the adapter error type
//!
//! Everything here is pure data; no I/O happens in this crate.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod record;
pub mod status;

pub use error::{AdapterError, Error, Operation, Result};
pub use record::{ObjectKey, ObjectMeta, Record};
pub use status::{ProvisionState, Status};
