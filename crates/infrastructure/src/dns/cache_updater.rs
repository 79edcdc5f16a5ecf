use super::cache::{NameStore, RecordId, StoredRecord, Table};
use super::wire::{serial_newer, soa_of};
use hickory_proto::rr::RData;
use lodestone_dns_domain::{CacheConfig, Credibility, DomainError, DomainName, RecordClass, RecordType};
use std::ops::BitOr;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateFlags(u8);

impl UpdateFlags {
    pub const NONE: UpdateFlags = UpdateFlags(0);
    /// Reject with `AlreadyExists` when identical data is present.
    pub const MUST_NOT_EXIST: UpdateFlags = UpdateFlags(0x01);
    /// Fail with `DataAbsent` unless the `old` pattern matches something.
    pub const MUST_EXIST: UpdateFlags = UpdateFlags(0x02);
    /// Remove everything the `old` pattern matches.
    pub const DELETE: UpdateFlags = UpdateFlags(0x04);
    /// Run the checks, change nothing.
    pub const MERGE: UpdateFlags = UpdateFlags(0x08);
    /// Replace equal-credibility data of the same type instead of adding to it.
    pub const REPLACE: UpdateFlags = UpdateFlags(0x10);
    /// Do not copy hint records into the hint table.
    pub const SUPPRESS_HINTS: UpdateFlags = UpdateFlags(0x20);
    /// Refuse to alter zone data.
    pub const NOT_AUTH: UpdateFlags = UpdateFlags(0x40);

    pub fn contains(self, other: UpdateFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for UpdateFlags {
    type Output = UpdateFlags;

    fn bitor(self, rhs: UpdateFlags) -> UpdateFlags {
        UpdateFlags(self.0 | rhs.0)
    }
}

/// Selects existing records by class and type, and optionally by data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPattern {
    pub class: RecordClass,
    pub record_type: RecordType,
    pub rdata: Option<RData>,
}

impl RecordPattern {
    pub fn new(class: RecordClass, record_type: RecordType) -> Self {
        Self {
            class,
            record_type,
            rdata: None,
        }
    }

    pub fn with_rdata(mut self, rdata: RData) -> Self {
        self.rdata = Some(rdata);
        self
    }

    pub fn matches(&self, record: &StoredRecord) -> bool {
        self.class.matches(record.class)
            && (self.record_type == record.record_type || self.record_type.matches(record.record_type))
            && self.rdata.as_ref().map_or(true, |data| *data == record.rdata)
    }
}

#[derive(Debug, Default)]
struct Plan {
    deletes: Vec<RecordId>,
}

impl Plan {
    fn delete(&mut self, id: RecordId) {
        if !self.deletes.contains(&id) {
            self.deletes.push(id);
        }
    }
}

/// Applies single-record mutations and whole-RRset replacements to a
/// [`NameStore`] under the credibility policy.
///
/// Every operation first builds a plan against the current node and only
/// touches the store once the plan is accepted. A rejected update leaves
/// the store exactly as it was, with one exception: an identical record
/// offered under `MUST_NOT_EXIST` refreshes the cached expiry before
/// `AlreadyExists` is returned.
pub struct CacheUpdater {
    min_cache_ttl: u32,
    max_cache_ttl: u32,
    max_negative_ttl: u32,
}

impl CacheUpdater {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            min_cache_ttl: config.min_cache_ttl,
            max_cache_ttl: config.max_cache_ttl,
            max_negative_ttl: config.max_negative_ttl,
        }
    }

    /// Clamps the expiry of a cache record into the configured TTL window.
    /// Negative entries only get the ceilings; the floor never lifts them
    /// past `max_negative_ttl`.
    pub fn prepare(&self, mut record: StoredRecord, now_secs: u64) -> StoredRecord {
        if record.is_cache() && !record.is_hint() {
            let ttl = if record.is_negative() {
                record.ttl.min(self.max_cache_ttl).min(self.max_negative_ttl)
            } else {
                record.ttl.clamp(self.min_cache_ttl, self.max_cache_ttl)
            };
            record.ttl = ttl;
            record.expires_at_secs = now_secs + u64::from(ttl);
        }
        record
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &self,
        store: &mut NameStore,
        table: Table,
        name: &DomainName,
        old: Option<&RecordPattern>,
        new: Option<StoredRecord>,
        flags: UpdateFlags,
        now_secs: u64,
    ) -> Result<(), DomainError> {
        let node = store.find_exact(table, name);
        if node.is_none() && new.is_none() {
            return Err(DomainError::NameNotFound);
        }
        let new = new.map(|r| self.prepare(r, now_secs));

        let mut plan = Plan::default();
        let mut live = Vec::new();
        if let Some(node) = node {
            for &id in store.node_records(table, node) {
                let record = store.record(id);
                if record.is_cache() && store.is_stale(id, now_secs) {
                    plan.delete(id);
                } else {
                    live.push(id);
                }
            }
        }

        if let Some(old) = old {
            let targets: Vec<RecordId> = live
                .iter()
                .copied()
                .filter(|&id| old.matches(store.record(id)))
                .collect();
            if targets.is_empty()
                && (flags.contains(UpdateFlags::MUST_EXIST) || flags.contains(UpdateFlags::DELETE))
            {
                return Err(DomainError::DataAbsent);
            }
            if flags.contains(UpdateFlags::DELETE) {
                for id in targets {
                    plan.delete(id);
                }
            }
        }

        if let Some(new) = &new {
            let candidates: Vec<RecordId> = live
                .iter()
                .copied()
                .filter(|id| !plan.deletes.contains(id))
                .collect();
            if let Some(existing) = self.plan_insert(store, &candidates, new, flags, &mut plan)? {
                if !flags.contains(UpdateFlags::MERGE) {
                    let record = store
                        .record_mut(existing)
                        .ok_or_else(|| DomainError::FatalInvariant("refreshed record vanished".into()))?;
                    record.expires_at_secs = record.expires_at_secs.max(new.expires_at_secs);
                }
                debug!(name = %name, record_type = %new.record_type, "Identical record already present");
                return Err(DomainError::AlreadyExists);
            }
        }

        if flags.contains(UpdateFlags::NOT_AUTH) && plan.deletes.iter().any(|&id| !store.record(id).is_cache()) {
            return Err(DomainError::AuthorityViolation);
        }

        if flags.contains(UpdateFlags::MERGE) {
            return Ok(());
        }

        let reflect = new
            .as_ref()
            .filter(|r| r.is_hint() && table == Table::Main && !flags.contains(UpdateFlags::SUPPRESS_HINTS))
            .cloned();

        self.apply(store, table, name, plan.deletes, new.into_iter().collect())?;

        if let Some(hint) = reflect {
            match self.update(
                store,
                Table::Hints,
                name,
                None,
                Some(hint),
                UpdateFlags::SUPPRESS_HINTS,
                now_secs,
            ) {
                Ok(()) => {}
                Err(e) if e.is_update_rejection() => {
                    debug!(name = %name, error = %e, "Hint not reflected");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Replaces the RRset identified by the records' owner, class and type
    /// with `records` in one step.
    pub fn commit_rrset(
        &self,
        store: &mut NameStore,
        table: Table,
        name: &DomainName,
        records: Vec<StoredRecord>,
        now_secs: u64,
    ) -> Result<(), DomainError> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let (class, rtype, credibility) = (first.class, first.record_type, first.credibility);
        if records
            .iter()
            .any(|r| r.class != class || r.record_type != rtype || r.credibility != credibility)
        {
            return Err(DomainError::FatalInvariant(format!(
                "mixed RRset offered for {}",
                name
            )));
        }
        let records: Vec<StoredRecord> = records.into_iter().map(|r| self.prepare(r, now_secs)).collect();

        let mut plan = Plan::default();
        let mut others = Vec::new();
        let mut existing_set = Vec::new();
        if let Some(node) = store.find_exact(table, name) {
            for &id in store.node_records(table, node) {
                let record = store.record(id);
                if record.is_cache() && store.is_stale(id, now_secs) {
                    plan.delete(id);
                } else if record.class == class && record.record_type == rtype {
                    existing_set.push(id);
                } else {
                    others.push(id);
                }
            }
        }

        for &id in &existing_set {
            let record = store.record(id);
            if record.credibility > credibility || !record.is_cache() {
                debug!(name = %name, record_type = %rtype, "Existing RRset outranks offered data");
                return Err(DomainError::AuthorityViolation);
            }
        }

        let identical = existing_set.len() == records.len()
            && existing_set.iter().all(|&id| store.record(id).credibility == credibility)
            && records
                .iter()
                .all(|new| existing_set.iter().any(|&id| store.record(id).same_content(new)));
        if identical {
            let expiry = records.iter().map(|r| r.expires_at_secs).max().unwrap_or(0);
            for &id in &existing_set {
                if let Some(record) = store.record_mut(id) {
                    record.expires_at_secs = record.expires_at_secs.max(expiry);
                }
            }
            debug!(name = %name, record_type = %rtype, "RRset refreshed");
            return Ok(());
        }

        for id in existing_set {
            plan.delete(id);
        }
        for new in &records {
            let candidates: Vec<RecordId> = others
                .iter()
                .copied()
                .filter(|id| !plan.deletes.contains(id))
                .collect();
            self.plan_insert(store, &candidates, new, UpdateFlags::REPLACE, &mut plan)?;
        }

        let reflect: Vec<StoredRecord> = if table == Table::Main {
            records.iter().filter(|r| r.is_hint()).cloned().collect()
        } else {
            Vec::new()
        };
        self.apply(store, table, name, plan.deletes, records)?;
        if !reflect.is_empty() {
            self.commit_rrset(store, Table::Hints, name, reflect, now_secs)?;
        }
        Ok(())
    }

    /// Checks `new` against the live records at its node. Records it
    /// displaces are added to `plan`. Returns the record to refresh when an
    /// identical one is found under `MUST_NOT_EXIST`.
    fn plan_insert(
        &self,
        store: &NameStore,
        live: &[RecordId],
        new: &StoredRecord,
        flags: UpdateFlags,
        plan: &mut Plan,
    ) -> Result<Option<RecordId>, DomainError> {
        for &id in live {
            let existing = store.record(id);
            if existing.class != new.class {
                continue;
            }
            if existing.record_type == new.record_type {
                if let Some(refresh) = self.plan_same_type(id, existing, new, flags, plan)? {
                    return Ok(Some(refresh));
                }
            } else {
                self.plan_other_type(id, existing, new, plan)?;
            }
        }
        Ok(None)
    }

    fn plan_other_type(
        &self,
        id: RecordId,
        existing: &StoredRecord,
        new: &StoredRecord,
        plan: &mut Plan,
    ) -> Result<(), DomainError> {
        if existing.is_nxdomain() {
            return if new.credibility >= existing.credibility {
                plan.delete(id);
                Ok(())
            } else {
                Err(DomainError::AuthorityViolation)
            };
        }
        if new.is_nxdomain() {
            return if existing.credibility <= new.credibility {
                plan.delete(id);
                Ok(())
            } else {
                Err(DomainError::AuthorityViolation)
            };
        }

        let cname_clash = (new.record_type == RecordType::CNAME
            && !existing.record_type.is_dnssec_metadata())
            || (existing.record_type == RecordType::CNAME && !new.record_type.is_dnssec_metadata());
        if cname_clash {
            return if existing.credibility < new.credibility {
                plan.delete(id);
                Ok(())
            } else {
                debug!(
                    existing = %existing.record_type,
                    offered = %new.record_type,
                    "CNAME cannot share an owner with other data"
                );
                Err(DomainError::AuthorityViolation)
            };
        }

        if new.credibility == Credibility::Zone && existing.credibility < Credibility::Zone {
            plan.delete(id);
            return Ok(());
        }
        if existing.credibility == Credibility::Zone && new.credibility < Credibility::Zone {
            return Err(DomainError::AuthorityViolation);
        }

        if existing.credibility == Credibility::Zone
            && new.credibility == Credibility::Zone
            && existing.clevel != new.clevel
        {
            let (glue, glue_is_existing) = if existing.clevel < new.clevel {
                (existing, true)
            } else {
                (new, false)
            };
            if glue.record_type.is_valid_glue() {
                warn!(
                    glue = %glue.record_type,
                    existing_zone = existing.zone.0,
                    offered_zone = new.zone.0,
                    "Glue kept, dropping data from the deeper zone"
                );
                if glue_is_existing {
                    return Err(DomainError::AuthorityViolation);
                }
                plan.delete(id);
                return Ok(());
            }
            warn!(
                record_type = %glue.record_type,
                existing_zone = existing.zone.0,
                offered_zone = new.zone.0,
                "Non-glue data above a zone cut"
            );
            if glue_is_existing {
                plan.delete(id);
                return Ok(());
            }
            return Err(DomainError::AuthorityViolation);
        }
        Ok(())
    }

    fn plan_same_type(
        &self,
        id: RecordId,
        existing: &StoredRecord,
        new: &StoredRecord,
        flags: UpdateFlags,
        plan: &mut Plan,
    ) -> Result<Option<RecordId>, DomainError> {
        let identical = existing.same_content(new);
        if identical
            && flags.contains(UpdateFlags::MUST_NOT_EXIST)
            && existing.credibility == new.credibility
        {
            return Ok(Some(id));
        }
        if new.credibility > existing.credibility {
            plan.delete(id);
            return Ok(None);
        }
        if new.credibility < existing.credibility {
            return Err(DomainError::AuthorityViolation);
        }

        if existing.clevel != new.clevel {
            return if new.clevel > existing.clevel {
                plan.delete(id);
                Ok(None)
            } else {
                Err(DomainError::AuthorityViolation)
            };
        }
        if identical {
            plan.delete(id);
            return Ok(None);
        }
        if new.record_type == RecordType::SOA && !existing.is_negative() && !new.is_negative() {
            let (Some(old_soa), Some(new_soa)) = (soa_of(&existing.rdata), soa_of(&new.rdata)) else {
                return Err(DomainError::FatalInvariant("SOA record without SOA data".into()));
            };
            return if serial_newer(new_soa.serial(), old_soa.serial()) {
                plan.delete(id);
                Ok(None)
            } else {
                Err(DomainError::AlreadyExists)
            };
        }
        if new.record_type.is_singleton()
            || existing.is_negative()
            || new.is_negative()
            || flags.contains(UpdateFlags::REPLACE)
        {
            plan.delete(id);
        }
        Ok(None)
    }

    fn apply(
        &self,
        store: &mut NameStore,
        table: Table,
        name: &DomainName,
        deletes: Vec<RecordId>,
        inserts: Vec<StoredRecord>,
    ) -> Result<(), DomainError> {
        let node = match store.find_exact(table, name) {
            Some(node) => node,
            None if inserts.is_empty() => return Ok(()),
            None => store.find_or_create(table, name),
        };
        for id in deletes {
            store.remove_record(table, node, id)?;
        }
        for record in inserts {
            debug!(
                name = %name,
                record_type = %record.record_type,
                credibility = %record.credibility,
                ttl = record.ttl,
                "Record stored"
            );
            store.insert_record(table, node, record)?;
        }
        store.prune(table, node);
        Ok(())
    }
}
