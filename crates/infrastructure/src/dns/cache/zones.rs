use super::record::StoredRecord;
use lodestone_dns_domain::{DomainName, RecordClass};
use std::cell::RefCell;
use tracing::warn;

/// Zone a record belongs to. Zone 0 is the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneId(pub u16);

impl ZoneId {
    pub const CACHE: ZoneId = ZoneId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneKind {
    Cache,
    Master,
    Slave,
    Stub,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKind::Cache => "cache",
            ZoneKind::Master => "master",
            ZoneKind::Slave => "slave",
            ZoneKind::Stub => "stub",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Zone {
    pub id: ZoneId,
    pub origin: DomainName,
    pub class: RecordClass,
    pub kind: ZoneKind,
    /// Unix seconds of the last successful load or transfer.
    pub last_refresh_secs: u64,
    /// SOA expire interval in seconds.
    pub expire_secs: u32,
}

impl Zone {
    pub fn clevel(&self) -> u8 {
        self.origin.label_count() as u8
    }

    fn expired(&self, now_secs: u64) -> bool {
        match self.kind {
            ZoneKind::Slave | ZoneKind::Stub => {
                now_secs < self.last_refresh_secs
                    || now_secs - self.last_refresh_secs > u64::from(self.expire_secs)
            }
            _ => false,
        }
    }
}

/// Descriptors of every zone known to the server.
pub struct ZoneTable {
    zones: Vec<Zone>,
    maintenance: RefCell<Vec<ZoneId>>,
}

impl Default for ZoneTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneTable {
    pub fn new() -> Self {
        Self {
            zones: vec![Zone {
                id: ZoneId::CACHE,
                origin: DomainName::root(),
                class: RecordClass::ANY,
                kind: ZoneKind::Cache,
                last_refresh_secs: 0,
                expire_secs: 0,
            }],
            maintenance: RefCell::new(Vec::new()),
        }
    }

    pub fn add(
        &mut self,
        origin: DomainName,
        class: RecordClass,
        kind: ZoneKind,
        expire_secs: u32,
        now_secs: u64,
    ) -> ZoneId {
        let id = ZoneId(self.zones.len() as u16);
        self.zones.push(Zone {
            id,
            origin,
            class,
            kind,
            last_refresh_secs: now_secs,
            expire_secs,
        });
        id
    }

    pub fn get(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn mark_refreshed(&mut self, id: ZoneId, now_secs: u64) {
        if let Some(zone) = self.zones.get_mut(id.0 as usize) {
            zone.last_refresh_secs = now_secs;
        }
    }

    /// Whether `record` must no longer be served. An expired secondary zone
    /// is queued for maintenance.
    pub fn is_stale(&self, record: &StoredRecord, now_secs: u64) -> bool {
        let Some(zone) = self.get(record.zone) else {
            return true;
        };
        match zone.kind {
            ZoneKind::Cache => !record.is_hint() && record.expires_at_secs <= now_secs,
            ZoneKind::Master => false,
            ZoneKind::Slave | ZoneKind::Stub => {
                if !zone.expired(now_secs) {
                    return false;
                }
                if now_secs < zone.last_refresh_secs {
                    warn!(zone = %zone.origin, "Clock moved backwards past last zone refresh");
                }
                let mut queue = self.maintenance.borrow_mut();
                if !queue.contains(&zone.id) {
                    queue.push(zone.id);
                }
                true
            }
        }
    }

    /// Zones found expired since the last call.
    pub fn take_maintenance_requests(&self) -> Vec<ZoneId> {
        std::mem::take(&mut *self.maintenance.borrow_mut())
    }

    /// Closest enclosing zone we answer authoritatively for.
    pub fn find_authoritative(
        &self,
        name: &DomainName,
        class: RecordClass,
        now_secs: u64,
    ) -> Option<&Zone> {
        self.zones
            .iter()
            .filter(|z| matches!(z.kind, ZoneKind::Master | ZoneKind::Slave))
            .filter(|z| class.matches(z.class) && name.is_subdomain_of(&z.origin))
            .filter(|z| !z.expired(now_secs))
            .max_by_key(|z| z.origin.label_count())
    }
}
