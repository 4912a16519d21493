//! Error taxonomy for the trading core.
//!
//! Every variant here is non-fatal to the process: protocol and constraint
//! failures are reported back to the offending session, resource failures
//! tell the caller to retry with fresh state, and transport failures are the
//! networking layer's problem (logged and skipped, never retried here).

use thiserror::Error;

use crate::offer::OfferId;

/// Malformed input that never reaches the registry: bad windows, bad
/// numbers, unknown update fields.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstraintError {
    #[error("window start ({start_min}m) must precede end ({end_min}m)")]
    EmptyWindow { start_min: u16, end_min: u16 },

    #[error("invalid clock time {0:?}, expected HH:MM")]
    BadClock(String),

    #[error("quantity must be positive")]
    NonPositiveQuantity,

    #[error("price must be non-negative")]
    NegativePrice,

    #[error("unknown update field {0:?}")]
    UnknownField(String),
}

/// Failures of registry lookups and mutations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("offer {0} not found")]
    NotFound(OfferId),

    #[error("offer {id} holds {available} kWh, {requested} requested")]
    Insufficient {
        id: OfferId,
        available: f64,
        requested: f64,
    },

    #[error("offer {0} belongs to another seller")]
    NotOwner(OfferId),

    #[error(transparent)]
    Constraint(#[from] ConstraintError),
}

/// Failures of a commit attempt by the transaction executor.
///
/// `Insufficient` and `WindowMismatch` map to `transaction_failed` on the
/// wire (the buyer should refresh and retry); `NotFound` maps to `error`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecuteError {
    #[error("offer {0} not found")]
    NotFound(OfferId),

    #[error("offer {id} holds {available} kWh, {requested} requested")]
    Insufficient {
        id: OfferId,
        available: f64,
        requested: f64,
    },

    #[error("buyer window no longer fits offer {0}")]
    WindowMismatch(OfferId),

    #[error(transparent)]
    Constraint(#[from] ConstraintError),
}

impl From<RegistryError> for ExecuteError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => ExecuteError::NotFound(id),
            RegistryError::Insufficient {
                id,
                available,
                requested,
            } => ExecuteError::Insufficient {
                id,
                available,
                requested,
            },
            RegistryError::NotOwner(id) => ExecuteError::NotFound(id),
            RegistryError::Constraint(c) => ExecuteError::Constraint(c),
        }
    }
}
