//! Campus Parking - slot booking service
//!
//! A fixed set of parking slots, each either free or holding one booking.
//! Booking a free slot issues a short opaque booking id; releasing frees it.
//! State is kept durable through a pluggable [`SlotStore`] (SQLite by
//! default) and served over HTTP as HTML pages and a JSON API.
//!
//! # Example
//!
//! ```rust
//! use campus_parking::{Registry, RegistryError};
//!
//! let registry = Registry::in_memory(&["A1", "A2"]).unwrap();
//! let booking = registry.book("A1").unwrap();
//! assert_eq!(booking.booking_id.as_str().len(), 8);
//!
//! assert!(matches!(registry.book("A1"), Err(RegistryError::AlreadyBooked(_))));
//! registry.release("A1").unwrap();
//! assert!(registry.get("A1").unwrap().is_free());
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐
//! │  HTTP server │   │  parking CLI │
//! └──────┬───────┘   └──────┬───────┘
//!        └────────┬─────────┘
//!                 ▼
//!        ┌─────────────────┐      ┌────────────────┐
//!        │    Registry     │─────▶│ Ticket artifact│  (best effort)
//!        │ per-slot locks  │      └────────────────┘
//!        └────────┬────────┘
//!                 ▼
//!        ┌─────────────────┐
//!        │    SlotStore    │  SQLite / memory
//!        └─────────────────┘
//! ```

#![warn(clippy::all)]

pub mod artifact;
pub mod config;
pub mod logging;
pub mod registry;
pub mod server;
pub mod store;

pub use artifact::{ArtifactError, NoArtifacts, QrTicketWriter, TicketArtifacts};
pub use config::{ConfigError, ParkingConfig, StorageBackend, CONFIG_FILE};
pub use registry::{
    Booking, BookingId, ErrorKind, Occupancy, Registry, RegistryError, RegistryResult, Slot,
    SlotId, SlotState,
};
pub use server::{build_router, AppState};
pub use store::{open_store, MemoryStore, RetryPolicy, SlotStore, SqliteStore, StoreError};
