//! Error types for the radio boundary.

use thiserror::Error;
use uuid::Uuid;

/// Failure to issue a request to the radio stack.
///
/// These cover the issue side only; failures of the operation itself
/// arrive later as the `error` field of the corresponding
/// [`RadioEvent`](crate::session::RadioEvent). The session manager logs
/// issue failures and moves on — nothing is raised to the caller.
#[derive(Debug, Error)]
pub enum RadioError {
    #[error("bluetooth adapter unavailable")]
    AdapterUnavailable,
    #[error("unknown peripheral: {0}")]
    PeripheralNotFound(String),
    #[error("service not resolved: {0}")]
    ServiceNotResolved(Uuid),
    #[error("characteristic not resolved: {0}")]
    CharacteristicNotResolved(Uuid),
    #[error("radio backend failure: {0}")]
    Backend(String),
}
