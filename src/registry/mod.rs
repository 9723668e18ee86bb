//! Slot Registry
//!
//! Owns the free/booked state of every configured parking slot and enforces
//! the single-booking-per-slot rule under concurrent callers.
//!
//! # Locking
//!
//! Each slot has its own `parking_lot::Mutex`. `book` and `release` hold that
//! lock across the state check, the durable write and the in-memory update,
//! so the three form one indivisible step per slot. No lock spans more than
//! one slot; operations on different slots never wait on each other.
//!
//! ```text
//!   FREE ──book──▶ BOOKED
//!    ▲               │
//!    └────release────┘
//! ```
//!
//! `book` on BOOKED and `release` on FREE leave the state alone and return
//! [`RegistryError::AlreadyBooked`] / [`RegistryError::NotBooked`].
//!
//! Another process may write the same store (the CLI next to a running
//! server). When a compare-and-set write misses, the slot is reloaded from
//! the store under its lock and the caller sees the stored state.

mod error;
mod token;
mod types;

pub use error::{ErrorKind, RegistryError, RegistryResult};
pub use token::TokenIssuer;
pub use types::{
    Booking, BookingId, Occupancy, Slot, SlotId, SlotState, BOOKING_ID_LEN, MAX_SLOT_ID_LEN,
};

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::ParkingConfig;
use crate::store::{open_store, RetryPolicy, SlotStore, StoreError};

/// One slot and its current booking.
struct SlotCell {
    id: SlotId,
    booking: Mutex<Option<BookingId>>,
}

/// Authoritative slot state.
pub struct Registry {
    /// Configuration order.
    slots: Vec<SlotCell>,
    index: HashMap<SlotId, usize>,
    store: Arc<dyn SlotStore>,
    tokens: TokenIssuer,
    retry: RetryPolicy,
}

impl Registry {
    /// Build a registry over `store` with the given slot list.
    ///
    /// Missing slots are added to the store as free rows; slots already
    /// persisted keep their booking. Persisted slots outside the list are
    /// left on disk and ignored.
    pub fn initialize<S>(
        slot_ids: &[S],
        store: Arc<dyn SlotStore>,
        retry: RetryPolicy,
    ) -> RegistryResult<Self>
    where
        S: AsRef<str>,
    {
        let ids = validate_slot_list(slot_ids)?;

        let inserted = store.ensure_slots(&ids).map_err(init_failure)?;
        let persisted = store.load().map_err(init_failure)?;
        let issued = store.issued_tokens().map_err(init_failure)?;

        let mut restored: HashMap<String, Option<BookingId>> = HashMap::new();
        for row in persisted {
            restored.insert(row.slot_id, row.booking_id);
        }

        let tokens = TokenIssuer::new();
        tokens.seed(issued);

        let mut slots = Vec::with_capacity(ids.len());
        let mut index = HashMap::with_capacity(ids.len());
        for (position, id) in ids.into_iter().enumerate() {
            let booking = restored.remove(id.as_str()).flatten();
            if let Some(b) = &booking {
                tokens.seed([b.as_str()]);
            }
            index.insert(id.clone(), position);
            slots.push(SlotCell {
                id,
                booking: Mutex::new(booking),
            });
        }

        if !restored.is_empty() {
            let mut orphaned: Vec<_> = restored.into_keys().collect();
            orphaned.sort();
            warn!(
                slots = ?orphaned,
                "persisted slots are not in the configured set; ignoring them"
            );
        }

        let registry = Self {
            slots,
            index,
            store,
            tokens,
            retry,
        };
        let occupancy = registry.occupancy();
        info!(
            store = registry.store.name(),
            slots = occupancy.total,
            booked = occupancy.booked,
            inserted,
            "slot registry initialized"
        );
        Ok(registry)
    }

    /// Open the configured store and initialize the configured slots.
    pub fn from_config(config: &ParkingConfig) -> RegistryResult<Self> {
        let store = open_store(&config.storage).map_err(init_failure)?;
        Self::initialize(&config.slots.ids, store, config.storage.retry_policy())
    }

    /// In-memory registry with the default retry policy.
    pub fn in_memory<S: AsRef<str>>(slot_ids: &[S]) -> RegistryResult<Self> {
        Self::initialize(
            slot_ids,
            Arc::new(crate::store::MemoryStore::new()),
            RetryPolicy::default(),
        )
    }

    fn cell(&self, slot_id: &str) -> RegistryResult<&SlotCell> {
        self.index
            .get(slot_id)
            .map(|&i| &self.slots[i])
            .ok_or_else(|| RegistryError::SlotNotFound(slot_id.to_string()))
    }

    /// Snapshot of every slot in configuration order. Each entry is
    /// consistent on its own; entries are read one lock at a time.
    pub fn list(&self) -> Vec<Slot> {
        self.slots
            .iter()
            .map(|cell| Slot {
                slot_id: cell.id.clone(),
                booking_id: cell.booking.lock().clone(),
            })
            .collect()
    }

    /// Point lookup.
    pub fn get(&self, slot_id: &str) -> RegistryResult<Slot> {
        let cell = self.cell(slot_id)?;
        let booking_id = cell.booking.lock().clone();
        Ok(Slot {
            slot_id: cell.id.clone(),
            booking_id,
        })
    }

    /// Book a free slot.
    pub fn book(&self, slot_id: &str) -> RegistryResult<Booking> {
        let cell = self.cell(slot_id).inspect_err(log_expected)?;
        let mut booking = cell.booking.lock();
        if booking.is_some() {
            return Err(rejected(RegistryError::AlreadyBooked(cell.id.to_string())));
        }

        let booking_id = self.tokens.issue();
        match self.retry.run(|| self.store.attach(&cell.id, &booking_id)) {
            Ok(()) => {}
            Err((attempts, source)) if is_conflict(&source) => {
                // Booked by another writer on the same store.
                if self.resync(cell, &mut booking)?.is_some() {
                    return Err(rejected(RegistryError::AlreadyBooked(cell.id.to_string())));
                }
                return Err(persist_failure(&cell.id, attempts, source));
            }
            Err((attempts, source)) => return Err(persist_failure(&cell.id, attempts, source)),
        }

        *booking = Some(booking_id.clone());
        info!(slot = %cell.id, booking = %booking_id, "slot booked");
        Ok(Booking {
            slot_id: cell.id.clone(),
            booking_id,
        })
    }

    /// Release a booked slot.
    pub fn release(&self, slot_id: &str) -> RegistryResult<()> {
        let cell = self.cell(slot_id).inspect_err(log_expected)?;
        let mut booking = cell.booking.lock();
        let mut current = match booking.as_ref() {
            Some(current) => current.clone(),
            None => return Err(rejected(RegistryError::NotBooked(cell.id.to_string()))),
        };

        let mut outcome = self.retry.run(|| self.store.detach(&cell.id, &current));
        if matches!(&outcome, Err((_, source)) if is_conflict(source)) {
            // Released or rebooked by another writer. Release whatever
            // booking the store holds now, once.
            match self.resync(cell, &mut booking)? {
                None => return Err(rejected(RegistryError::NotBooked(cell.id.to_string()))),
                Some(stored) => {
                    current = stored;
                    outcome = self.retry.run(|| self.store.detach(&cell.id, &current));
                }
            }
        }
        outcome.map_err(|(attempts, source)| persist_failure(&cell.id, attempts, source))?;

        *booking = None;
        info!(slot = %cell.id, booking = %current, "slot released");
        Ok(())
    }

    /// Reload one slot from the store after a compare-and-set miss, under the
    /// slot lock. Returns the stored booking now mirrored in memory.
    fn resync(
        &self,
        cell: &SlotCell,
        booking: &mut Option<BookingId>,
    ) -> RegistryResult<Option<BookingId>> {
        let stored = self
            .retry
            .run(|| self.store.fetch(&cell.id))
            .map_err(|(attempts, source)| persist_failure(&cell.id, attempts, source))?;
        if let Some(id) = &stored {
            self.tokens.seed([id.as_str()]);
        }
        warn!(
            slot = %cell.id,
            memory = ?booking,
            stored = ?stored,
            "slot changed outside this registry; reloaded from store"
        );
        *booking = stored.clone();
        Ok(stored)
    }

    /// True if the slot currently holds exactly `booking_id` (ticket check).
    pub fn validate(&self, slot_id: &str, booking_id: &str) -> RegistryResult<bool> {
        let cell = self.cell(slot_id)?;
        let valid = cell
            .booking
            .lock()
            .as_ref()
            .is_some_and(|b| b.as_str() == booking_id);
        debug!(slot = %cell.id, valid, "ticket validated");
        Ok(valid)
    }

    /// Counts of total, booked and free slots.
    pub fn occupancy(&self) -> Occupancy {
        let booked = self
            .slots
            .iter()
            .filter(|cell| cell.booking.lock().is_some())
            .count();
        Occupancy::from_counts(self.slots.len(), booked)
    }

    /// Configured slot ids in order.
    pub fn slot_ids(&self) -> impl Iterator<Item = &SlotId> {
        self.slots.iter().map(|cell| &cell.id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }
}

/// Validate a configured slot list: non-empty, well-formed, no duplicates.
pub fn validate_slot_list<S: AsRef<str>>(slot_ids: &[S]) -> RegistryResult<Vec<SlotId>> {
    if slot_ids.is_empty() {
        return Err(RegistryError::Config("slot list is empty".into()));
    }
    let mut seen = HashSet::with_capacity(slot_ids.len());
    let mut ids = Vec::with_capacity(slot_ids.len());
    for raw in slot_ids {
        let id = SlotId::new(raw.as_ref())?;
        if !seen.insert(id.clone()) {
            return Err(RegistryError::Config(format!("duplicate slot id '{}'", id)));
        }
        ids.push(id);
    }
    Ok(ids)
}

fn log_expected(err: &RegistryError) {
    debug!(kind = %err.kind(), "{}", err);
}

fn rejected(err: RegistryError) -> RegistryError {
    log_expected(&err);
    err
}

fn is_conflict(err: &StoreError) -> bool {
    matches!(err, StoreError::Conflict { .. })
}

fn init_failure(source: StoreError) -> RegistryError {
    error!(error = %source, "failed to load slot state");
    RegistryError::Init(source)
}

fn persist_failure(slot_id: &SlotId, attempts: u32, source: StoreError) -> RegistryError {
    error!(slot = %slot_id, attempts, error = %source, "failed to persist slot transition");
    RegistryError::Persistence {
        slot_id: slot_id.to_string(),
        attempts,
        source,
    }
}
