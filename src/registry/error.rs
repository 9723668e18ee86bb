//! Error types for registry operations.

use thiserror::Error;

use crate::store::StoreError;

/// Errors returned by [`Registry`](super::Registry) operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Invalid or duplicate initial slot list. Fatal at startup.
    #[error("invalid slot configuration: {0}")]
    Config(String),

    /// The slot id is not part of the configured set.
    #[error("slot '{0}' not found")]
    SlotNotFound(String),

    /// `book` on a slot that already holds a booking.
    #[error("slot '{0}' is already booked")]
    AlreadyBooked(String),

    /// `release` on a free slot.
    #[error("slot '{0}' is not booked")]
    NotBooked(String),

    /// Slot state could not be read or seeded at startup.
    #[error("failed to load slot state: {0}")]
    Init(#[source] StoreError),

    /// The durable write failed; in-memory state was left unchanged.
    #[error("persistence failed for {slot_id} after {attempts} attempt(s): {source}")]
    Persistence {
        slot_id: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

/// Stable, machine-readable error kind (used in API responses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    SlotNotFound,
    AlreadyBooked,
    NotBooked,
    Persistence,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config_error",
            ErrorKind::SlotNotFound => "slot_not_found",
            ErrorKind::AlreadyBooked => "already_booked",
            ErrorKind::NotBooked => "not_booked",
            ErrorKind::Persistence => "persistence_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Config(_) => ErrorKind::Config,
            RegistryError::SlotNotFound(_) => ErrorKind::SlotNotFound,
            RegistryError::AlreadyBooked(_) => ErrorKind::AlreadyBooked,
            RegistryError::NotBooked(_) => ErrorKind::NotBooked,
            RegistryError::Init(_) | RegistryError::Persistence { .. } => {
                ErrorKind::Persistence
            }
        }
    }

    /// Expected outcomes a caller maps to a user-facing message.
    /// These are never logged as system errors.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            RegistryError::SlotNotFound(_)
                | RegistryError::AlreadyBooked(_)
                | RegistryError::NotBooked(_)
        )
    }
}

/// Result type alias for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;
