//! SQLite-backed store.
//!
//! `parking_slots` holds one row per slot; `issued_bookings` keeps
//! every token ever attached so restarts never reissue one.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

use super::{SlotStore, StoreError, StoreResult, StoredSlot};
use crate::registry::{BookingId, SlotId};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS parking_slots (
    id INTEGER PRIMARY KEY,
    slot_id TEXT NOT NULL UNIQUE,
    booking_id TEXT NULL
);
CREATE TABLE IF NOT EXISTS issued_bookings (
    booking_id TEXT PRIMARY KEY
);
";

/// How long a writer waits on a locked database before SQLITE_BUSY.
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, mainly for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn current_booking(conn: &Connection, slot_id: &str) -> StoreResult<Option<String>> {
        let row: Option<Option<String>> = conn
            .query_row(
                "SELECT booking_id FROM parking_slots WHERE slot_id = ?1",
                params![slot_id],
                |row| row.get(0),
            )
            .optional()?;
        row.ok_or_else(|| StoreError::UnknownSlot(slot_id.to_string()))
    }
}

impl SlotStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn ensure_slots(&self, ids: &[SlotId]) -> StoreResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut inserted = 0;
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO parking_slots (slot_id) VALUES (?1)")?;
            for id in ids {
                inserted += stmt.execute(params![id.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn load(&self) -> StoreResult<Vec<StoredSlot>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT slot_id, booking_id FROM parking_slots ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredSlot {
                slot_id: row.get(0)?,
                booking_id: row.get::<_, Option<String>>(1)?.map(BookingId::from_raw),
            })
        })?;
        let mut slots = Vec::new();
        for row in rows {
            slots.push(row?);
        }
        Ok(slots)
    }

    fn fetch(&self, slot_id: &SlotId) -> StoreResult<Option<BookingId>> {
        let conn = self.conn.lock();
        Ok(Self::current_booking(&conn, slot_id.as_str())?.map(BookingId::from_raw))
    }

    fn issued_tokens(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT booking_id FROM issued_bookings")?;
        let tokens = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tokens)
    }

    fn attach(&self, slot_id: &SlotId, booking_id: &BookingId) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let updated = tx.execute(
            "UPDATE parking_slots SET booking_id = ?1 WHERE slot_id = ?2 AND booking_id IS NULL",
            params![booking_id.as_str(), slot_id.as_str()],
        )?;
        if updated != 1 {
            let detail = match Self::current_booking(&tx, slot_id.as_str())? {
                Some(existing) => format!("already holds booking {}", existing),
                None => "row not updated".to_string(),
            };
            return Err(StoreError::Conflict {
                slot_id: slot_id.to_string(),
                detail,
            });
        }
        tx.execute(
            "INSERT OR IGNORE INTO issued_bookings (booking_id) VALUES (?1)",
            params![booking_id.as_str()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn detach(&self, slot_id: &SlotId, booking_id: &BookingId) -> StoreResult<()> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE parking_slots SET booking_id = NULL WHERE slot_id = ?1 AND booking_id = ?2",
            params![slot_id.as_str(), booking_id.as_str()],
        )?;
        if updated != 1 {
            let found = Self::current_booking(&conn, slot_id.as_str())?;
            return Err(StoreError::Conflict {
                slot_id: slot_id.to_string(),
                detail: format!(
                    "expected booking {}, found {}",
                    booking_id,
                    found.as_deref().unwrap_or("none")
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<SlotId> {
        raw.iter().map(|s| SlotId::new(*s).unwrap()).collect()
    }

    #[test]
    fn test_schema_and_ensure() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.ensure_slots(&ids(&["A1", "A2", "B1"])).unwrap(), 3);
        assert_eq!(store.ensure_slots(&ids(&["A1", "C1"])).unwrap(), 1);
        let rows = store.load().unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.slot_id.as_str()).collect();
        assert_eq!(names, vec!["A1", "A2", "B1", "C1"]);
        assert!(rows.iter().all(|r| r.booking_id.is_none()));
    }

    #[test]
    fn test_attach_is_compare_and_set() {
        let store = SqliteStore::open_in_memory().unwrap();
        let slots = ids(&["A1"]);
        store.ensure_slots(&slots).unwrap();

        store
            .attach(&slots[0], &BookingId::from_raw("aaaa0000"))
            .unwrap();
        let err = store
            .attach(&slots[0], &BookingId::from_raw("bbbb0000"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert!(!err.is_retryable());

        let rows = store.load().unwrap();
        assert_eq!(rows[0].booking_id, Some(BookingId::from_raw("aaaa0000")));
        assert_eq!(
            store.fetch(&slots[0]).unwrap(),
            Some(BookingId::from_raw("aaaa0000"))
        );
        assert!(matches!(
            store.fetch(&SlotId::new("Z9").unwrap()),
            Err(StoreError::UnknownSlot(_))
        ));
    }

    #[test]
    fn test_detach_requires_matching_booking() {
        let store = SqliteStore::open_in_memory().unwrap();
        let slots = ids(&["A1"]);
        store.ensure_slots(&slots).unwrap();
        let booking = BookingId::from_raw("cccc0000");
        store.attach(&slots[0], &booking).unwrap();

        assert!(store
            .detach(&slots[0], &BookingId::from_raw("dddd0000"))
            .is_err());
        store.detach(&slots[0], &booking).unwrap();
        assert!(store.detach(&slots[0], &booking).is_err());
        assert_eq!(store.issued_tokens().unwrap(), vec!["cccc0000".to_string()]);
    }

    #[test]
    fn test_unknown_slot() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .attach(&SlotId::new("Q1").unwrap(), &BookingId::from_raw("eeee0000"))
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownSlot(_)));
    }
}
