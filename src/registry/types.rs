//! Registry data model
//!
//! Slot and booking identifiers plus the snapshot types handed out by the
//! registry. Identifiers are validated newtypes so nothing downstream has to
//! re-check them.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use super::error::RegistryError;

/// Maximum slot identifier length (matches the `String(10)` slot column).
pub const MAX_SLOT_ID_LEN: usize = 10;

/// Length of a rendered booking token.
pub const BOOKING_ID_LEN: usize = 8;

/// Length of the full 128-bit rendering used if short tokens run out.
pub const WIDE_BOOKING_ID_LEN: usize = 32;

/// Human-readable parking slot key, e.g. `A1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotId(String);

impl SlotId {
    /// Create a slot id. Ids are 1..=10 characters of `[A-Za-z0-9_-]`.
    pub fn new(id: impl Into<String>) -> Result<Self, RegistryError> {
        let id = id.into();
        if id.is_empty() {
            return Err(RegistryError::Config("slot id must not be empty".into()));
        }
        if id.len() > MAX_SLOT_ID_LEN {
            return Err(RegistryError::Config(format!(
                "slot id '{}' is longer than {} characters",
                id, MAX_SLOT_ID_LEN
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(RegistryError::Config(format!(
                "slot id '{}' may only contain [A-Za-z0-9_-]",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SlotId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SlotId {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SlotId> for String {
    fn from(id: SlotId) -> Self {
        id.0
    }
}

/// Opaque booking token. Only the registry mints these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(String);

impl BookingId {
    /// Wrap an already-issued token (persisted state, scanned tickets).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this looks like a token the registry could have minted.
    pub fn is_well_formed(raw: &str) -> bool {
        (raw.len() == BOOKING_ID_LEN || raw.len() == WIDE_BOOKING_ID_LEN)
            && raw.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An active occupancy of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub slot_id: SlotId,
    pub booking_id: BookingId,
}

impl Booking {
    /// Payload encoded into the QR ticket.
    pub fn ticket_payload(&self) -> String {
        format!("Slot: {}, BookingID: {}", self.slot_id, self.booking_id)
    }
}

/// Point-in-time view of a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub slot_id: SlotId,
    pub booking_id: Option<BookingId>,
}

impl Slot {
    pub fn is_free(&self) -> bool {
        self.booking_id.is_none()
    }

    pub fn state(&self) -> SlotState {
        if self.is_free() {
            SlotState::Free
        } else {
            SlotState::Booked
        }
    }
}

/// The two states of the per-slot machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    Free,
    Booked,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::Free => write!(f, "free"),
            SlotState::Booked => write!(f, "booked"),
        }
    }
}

/// Occupancy summary shown on the admin page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    pub total: usize,
    pub booked: usize,
    pub free: usize,
}

impl Occupancy {
    pub fn from_counts(total: usize, booked: usize) -> Self {
        Self {
            total,
            booked,
            free: total - booked,
        }
    }

    /// Counts for one `list` snapshot, consistent with the rows shown.
    pub fn of(slots: &[Slot]) -> Self {
        Self::from_counts(slots.len(), slots.iter().filter(|s| !s.is_free()).count())
    }
}
