//! Durable slot state
//!
//! The registry decides every transition; a [`SlotStore`] only makes the
//! decision durable. Writes are compare-and-set on a single slot row, so a
//! store that disagrees with the registry reports a [`StoreError::Conflict`]
//! instead of silently overwriting state.
//!
//! Backends:
//! - [`MemoryStore`] - process-local, optional failure injection
//! - [`SqliteStore`] - `parking_slots` table via rusqlite

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{StorageBackend, StorageConfig};
use crate::registry::{BookingId, SlotId};

/// Open the store selected by the storage configuration.
pub fn open_store(config: &StorageConfig) -> StoreResult<Arc<dyn SlotStore>> {
    let store: Arc<dyn SlotStore> = match config.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Sqlite => Arc::new(SqliteStore::open(&config.path)?),
    };
    Ok(store)
}

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted row did not match the expected pre-state.
    #[error("conflicting state for slot '{slot_id}': {detail}")]
    Conflict { slot_id: String, detail: String },

    /// Row missing for a slot the registry believes exists.
    #[error("slot '{0}' is missing from the store")]
    UnknownSlot(String),

    /// Failure injected by [`MemoryStore::fail_next`].
    #[error("injected failure ({transient})")]
    Injected { transient: bool },
}

impl StoreError {
    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            StoreError::Sqlite(_) => false,
            StoreError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
            ),
            StoreError::Injected { transient } => *transient,
            StoreError::Conflict { .. } | StoreError::UnknownSlot(_) => false,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// One persisted slot row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSlot {
    pub slot_id: String,
    pub booking_id: Option<BookingId>,
}

/// Durable backing for registry state.
///
/// Implementations must be safe to call from many threads. Each mutating call
/// touches exactly one slot row and either applies fully or not at all.
pub trait SlotStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Insert a free row for every id not yet present. Existing rows are left
    /// untouched. Returns the number of inserted rows.
    fn ensure_slots(&self, ids: &[SlotId]) -> StoreResult<usize>;

    /// All persisted rows in insertion order.
    fn load(&self) -> StoreResult<Vec<StoredSlot>>;

    /// Persisted booking of one slot.
    fn fetch(&self, slot_id: &SlotId) -> StoreResult<Option<BookingId>>;

    /// Every booking token this store has ever recorded, active or not.
    fn issued_tokens(&self) -> StoreResult<Vec<String>> {
        Ok(Vec::new())
    }

    /// Set the slot's booking if, and only if, it is currently free.
    fn attach(&self, slot_id: &SlotId, booking_id: &BookingId) -> StoreResult<()>;

    /// Clear the slot's booking if, and only if, it currently holds `booking_id`.
    fn detach(&self, slot_id: &SlotId, booking_id: &BookingId) -> StoreResult<()>;
}

/// Bounded retry for retryable store errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (minimum 1).
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// No retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Returns the attempts used alongside any error.
    pub fn run<T, F>(&self, mut op: F) -> Result<T, (u32, StoreError)>
    where
        F: FnMut() -> StoreResult<T>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    tracing::debug!(attempt, error = %err, "retrying store operation");
                    if !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff);
                    }
                    attempt += 1;
                }
                Err(err) => return Err((attempt, err)),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(25))
    }
}
