//! In-process store.

use parking_lot::Mutex;
use std::collections::HashMap;

use super::{SlotStore, StoreError, StoreResult, StoredSlot};
use crate::registry::{BookingId, SlotId};

#[derive(Default)]
struct Inner {
    rows: Vec<StoredSlot>,
    index: HashMap<String, usize>,
    issued: Vec<String>,
    /// Pending injected failures, consumed by mutating calls.
    failures: Vec<bool>,
}

/// Store that keeps rows in memory. State dies with the process.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` `attach`/`detach` calls fail. Transient failures
    /// are retryable, permanent ones are not.
    pub fn fail_next(&self, count: usize, transient: bool) {
        let mut inner = self.inner.lock();
        inner.failures.extend(std::iter::repeat(transient).take(count));
    }

    /// Overwrite a row directly, bypassing compare-and-set. Simulates another
    /// writer touching the same backing store.
    pub fn force(&self, slot_id: &str, booking_id: Option<&str>) {
        let mut inner = self.inner.lock();
        if let Some(&idx) = inner.index.get(slot_id) {
            inner.rows[idx].booking_id = booking_id.map(BookingId::from_raw);
        }
    }

    fn take_failure(inner: &mut Inner) -> StoreResult<()> {
        if inner.failures.is_empty() {
            return Ok(());
        }
        let transient = inner.failures.remove(0);
        Err(StoreError::Injected { transient })
    }
}

impl SlotStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn ensure_slots(&self, ids: &[SlotId]) -> StoreResult<usize> {
        let mut inner = self.inner.lock();
        let mut inserted = 0;
        for id in ids {
            if inner.index.contains_key(id.as_str()) {
                continue;
            }
            let idx = inner.rows.len();
            inner.rows.push(StoredSlot {
                slot_id: id.as_str().to_string(),
                booking_id: None,
            });
            inner.index.insert(id.as_str().to_string(), idx);
            inserted += 1;
        }
        Ok(inserted)
    }

    fn load(&self) -> StoreResult<Vec<StoredSlot>> {
        Ok(self.inner.lock().rows.clone())
    }

    fn fetch(&self, slot_id: &SlotId) -> StoreResult<Option<BookingId>> {
        let inner = self.inner.lock();
        let idx = *inner
            .index
            .get(slot_id.as_str())
            .ok_or_else(|| StoreError::UnknownSlot(slot_id.to_string()))?;
        Ok(inner.rows[idx].booking_id.clone())
    }

    fn issued_tokens(&self) -> StoreResult<Vec<String>> {
        Ok(self.inner.lock().issued.clone())
    }

    fn attach(&self, slot_id: &SlotId, booking_id: &BookingId) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        Self::take_failure(&mut inner)?;
        let idx = *inner
            .index
            .get(slot_id.as_str())
            .ok_or_else(|| StoreError::UnknownSlot(slot_id.to_string()))?;
        if let Some(existing) = &inner.rows[idx].booking_id {
            return Err(StoreError::Conflict {
                slot_id: slot_id.to_string(),
                detail: format!("already holds booking {}", existing),
            });
        }
        inner.rows[idx].booking_id = Some(booking_id.clone());
        inner.issued.push(booking_id.as_str().to_string());
        Ok(())
    }

    fn detach(&self, slot_id: &SlotId, booking_id: &BookingId) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        Self::take_failure(&mut inner)?;
        let idx = *inner
            .index
            .get(slot_id.as_str())
            .ok_or_else(|| StoreError::UnknownSlot(slot_id.to_string()))?;
        let row = &mut inner.rows[idx];
        if row.booking_id.as_ref() != Some(booking_id) {
            return Err(StoreError::Conflict {
                slot_id: slot_id.to_string(),
                detail: format!(
                    "expected booking {}, found {}",
                    booking_id,
                    row.booking_id.as_ref().map(|b| b.as_str()).unwrap_or("none")
                ),
            });
        }
        row.booking_id = None;
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
    fn test_ensure_slots_idempotent() {
        let store = MemoryStore::new();
        assert_eq!(store.ensure_slots(&ids(&["A1", "A2"])).unwrap(), 2);
        assert_eq!(store.ensure_slots(&ids(&["A1", "A2", "B1"])).unwrap(), 1);
        let rows = store.load().unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.slot_id.as_str()).collect();
        assert_eq!(names, vec!["A1", "A2", "B1"]);
    }

    #[test]
    fn test_attach_detach_cas() {
        let store = MemoryStore::new();
        let slots = ids(&["A1"]);
        store.ensure_slots(&slots).unwrap();
        let first = BookingId::from_raw("11111111");
        let second = BookingId::from_raw("22222222");

        store.attach(&slots[0], &first).unwrap();
        assert!(matches!(
            store.attach(&slots[0], &second),
            Err(StoreError::Conflict { .. })
        ));
        assert!(matches!(
            store.detach(&slots[0], &second),
            Err(StoreError::Conflict { .. })
        ));
        assert_eq!(store.fetch(&slots[0]).unwrap(), Some(first.clone()));
        store.detach(&slots[0], &first).unwrap();
        assert_eq!(store.fetch(&slots[0]).unwrap(), None);
        assert_eq!(store.issued_tokens().unwrap(), vec!["11111111".to_string()]);
    }

    #[test]
    fn test_injected_failures() {
        let store = MemoryStore::new();
        let slots = ids(&["A1"]);
        store.ensure_slots(&slots).unwrap();
        store.fail_next(1, false);
        let booking = BookingId::from_raw("33333333");
        let err = store.attach(&slots[0], &booking).unwrap_err();
        assert!(!err.is_retryable());
        store.attach(&slots[0], &booking).unwrap();
    }

    #[test]
    fn test_unknown_slot() {
        let store = MemoryStore::new();
        let slot = SlotId::new("Z9").unwrap();
        assert!(matches!(
            store.attach(&slot, &BookingId::from_raw("44444444")),
            Err(StoreError::UnknownSlot(_))
        ));
    }
}
