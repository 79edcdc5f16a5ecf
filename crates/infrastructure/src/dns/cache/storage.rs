use super::record::{RecordFlags, StoredRecord};
use lodestone_dns_domain::DomainError;
use std::ops::Index;
use tracing::trace;

/// Handle to a record slot in a [`RecordStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub u32);

/// Slot arena holding every record of a server. A record is referenced by
/// the node list it is active in plus any in-flight holder; the slot is
/// recycled when the last reference goes away.
#[derive(Default)]
pub struct RecordStore {
    slots: Vec<StoredRecord>,
    free: Vec<u32>,
    live: usize,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records not yet freed.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Places `record` in a slot with refcount 0. The caller must activate
    /// or retain it, or free it with [`RecordStore::discard`].
    pub fn allocate(&mut self, mut record: StoredRecord) -> RecordId {
        record.refcount = 0;
        record.flags.remove(RecordFlags::ACTIVE | RecordFlags::FREE);
        self.live += 1;
        if let Some(slot) = self.free.pop() {
            self.slots[slot as usize] = record;
            RecordId(slot)
        } else {
            self.slots.push(record);
            RecordId((self.slots.len() - 1) as u32)
        }
    }

    pub fn get(&self, id: RecordId) -> Option<&StoredRecord> {
        self.slots
            .get(id.0 as usize)
            .filter(|r| !r.flags.contains(RecordFlags::FREE))
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut StoredRecord> {
        self.slots
            .get_mut(id.0 as usize)
            .filter(|r| !r.flags.contains(RecordFlags::FREE))
    }

    /// Marks the record as linked into a node list.
    pub fn activate(&mut self, id: RecordId) -> Result<(), DomainError> {
        let record = self.slot_mut(id)?;
        if record.flags.contains(RecordFlags::ACTIVE) {
            return Err(DomainError::FatalInvariant(format!(
                "record {} activated twice",
                id.0
            )));
        }
        record.refcount = record
            .refcount
            .checked_add(1)
            .ok_or_else(|| DomainError::FatalInvariant(format!("refcount overflow on {}", id.0)))?;
        record.flags.insert(RecordFlags::ACTIVE);
        Ok(())
    }

    /// Marks the record as unlinked and drops the list's reference.
    pub fn deactivate(&mut self, id: RecordId) -> Result<(), DomainError> {
        let record = self.slot_mut(id)?;
        if !record.flags.contains(RecordFlags::ACTIVE) {
            return Err(DomainError::FatalInvariant(format!(
                "record {} deactivated while inactive",
                id.0
            )));
        }
        record.flags.remove(RecordFlags::ACTIVE);
        self.release(id)
    }

    /// Adds a reference for a holder outside the tree.
    pub fn retain(&mut self, id: RecordId) -> Result<(), DomainError> {
        let record = self.slot_mut(id)?;
        record.refcount = record
            .refcount
            .checked_add(1)
            .ok_or_else(|| DomainError::FatalInvariant(format!("refcount overflow on {}", id.0)))?;
        Ok(())
    }

    /// Drops one reference; frees the slot at zero.
    pub fn release(&mut self, id: RecordId) -> Result<(), DomainError> {
        let record = self.slot_mut(id)?;
        if record.refcount == 0 {
            return Err(DomainError::FatalInvariant(format!(
                "refcount underflow on {}",
                id.0
            )));
        }
        record.refcount -= 1;
        if record.refcount == 0 {
            self.free_slot(id);
        }
        Ok(())
    }

    /// Frees an allocated record that was never referenced.
    pub fn discard(&mut self, id: RecordId) -> Result<(), DomainError> {
        let record = self.slot_mut(id)?;
        if record.refcount != 0 {
            return Err(DomainError::FatalInvariant(format!(
                "discarding referenced record {}",
                id.0
            )));
        }
        self.free_slot(id);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &StoredRecord)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.flags.contains(RecordFlags::FREE))
            .map(|(i, r)| (RecordId(i as u32), r))
    }

    fn slot_mut(&mut self, id: RecordId) -> Result<&mut StoredRecord, DomainError> {
        self.get_mut(id)
            .ok_or_else(|| DomainError::FatalInvariant(format!("record {} is not allocated", id.0)))
    }

    fn free_slot(&mut self, id: RecordId) {
        let record = &mut self.slots[id.0 as usize];
        record.flags = RecordFlags::FREE;
        record.negative = None;
        self.free.push(id.0);
        self.live -= 1;
        trace!(record = id.0, "Record slot freed");
    }
}

impl Index<RecordId> for RecordStore {
    type Output = StoredRecord;

    fn index(&self, id: RecordId) -> &StoredRecord {
        &self.slots[id.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::wire::rdata::address_rdata;
    use lodestone_dns_domain::{Credibility, RecordClass, RecordType};
    use std::net::Ipv4Addr;

    fn record() -> StoredRecord {
        StoredRecord::cached(
            RecordClass::IN,
            RecordType::A,
            60,
            address_rdata(Ipv4Addr::new(10, 0, 0, 1).into()),
            Credibility::Additional,
            0,
        )
    }

    #[test]
    fn test_activate_then_deactivate_frees_slot() {
        let mut store = RecordStore::new();
        let id = store.allocate(record());
        store.activate(id).unwrap();
        assert_eq!(store[id].refcount, 1);
        assert!(store[id].is_active());

        store.deactivate(id).unwrap();
        assert!(store.get(id).is_none());
        assert!(store.is_empty());

        let reused = store.allocate(record());
        assert_eq!(reused, id);
    }

    #[test]
    fn test_holder_keeps_record_alive_after_unlink() {
        let mut store = RecordStore::new();
        let id = store.allocate(record());
        store.activate(id).unwrap();
        store.retain(id).unwrap();
        store.deactivate(id).unwrap();

        assert_eq!(store[id].refcount, 1);
        assert!(!store[id].is_active());
        store.release(id).unwrap();
        assert!(store.get(id).is_none());
    }

    #[test]
    fn test_double_activation_is_fatal() {
        let mut store = RecordStore::new();
        let id = store.allocate(record());
        store.activate(id).unwrap();
        let err = store.activate(id).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_deactivate_inactive_is_fatal() {
        let mut store = RecordStore::new();
        let id = store.allocate(record());
        store.retain(id).unwrap();
        assert!(store.deactivate(id).unwrap_err().is_fatal());
    }

    #[test]
    fn test_release_underflow_is_fatal() {
        let mut store = RecordStore::new();
        let id = store.allocate(record());
        assert!(store.release(id).unwrap_err().is_fatal());
        store.discard(id).unwrap();
        assert!(store.release(id).unwrap_err().is_fatal());
    }
}
