use super::zones::ZoneId;
use hickory_proto::rr::RData;
use lodestone_dns_domain::{Credibility, DomainName, RecordClass, RecordType, SecurityState};
use std::ops::{BitOr, BitOrAssign};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordFlags(u8);

impl RecordFlags {
    pub const NONE: RecordFlags = RecordFlags(0);
    /// Root hint data. Never stale.
    pub const HINT: RecordFlags = RecordFlags(0x01);
    /// Linked into a node's record list.
    pub const ACTIVE: RecordFlags = RecordFlags(0x02);
    /// Slot returned to the store.
    pub const FREE: RecordFlags = RecordFlags(0x04);
    /// Data learnt from a server found to be lame.
    pub const LAME: RecordFlags = RecordFlags(0x08);

    pub fn contains(self, other: RecordFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: RecordFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: RecordFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for RecordFlags {
    type Output = RecordFlags;

    fn bitor(self, rhs: RecordFlags) -> RecordFlags {
        RecordFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for RecordFlags {
    fn bitor_assign(&mut self, rhs: RecordFlags) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegativeKind {
    NxDomain,
    NoData,
}

impl NegativeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegativeKind::NxDomain => "NXDOMAIN",
            NegativeKind::NoData => "NODATA",
        }
    }
}

/// Marker carried by negative cache entries. The record's rdata is the SOA
/// of `soa_owner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegativeInfo {
    pub kind: NegativeKind,
    pub soa_owner: DomainName,
}

/// One resource record as held by the store.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub zone: ZoneId,
    pub class: RecordClass,
    pub record_type: RecordType,
    /// TTL as received or configured.
    pub ttl: u32,
    /// Absolute expiry (unix seconds). Meaningful for cache data only.
    pub expires_at_secs: u64,
    pub flags: RecordFlags,
    pub credibility: Credibility,
    pub security: SecurityState,
    /// Label count of the zone cut this record was loaded under.
    pub clevel: u8,
    pub refcount: u32,
    pub rdata: RData,
    pub negative: Option<NegativeInfo>,
}

impl StoredRecord {
    /// A cache record expiring `ttl` seconds after `now_secs`.
    pub fn cached(
        class: RecordClass,
        record_type: RecordType,
        ttl: u32,
        rdata: RData,
        credibility: Credibility,
        now_secs: u64,
    ) -> Self {
        Self {
            zone: ZoneId::CACHE,
            class,
            record_type,
            ttl,
            expires_at_secs: now_secs + u64::from(ttl),
            flags: RecordFlags::NONE,
            credibility,
            security: SecurityState::Unchecked,
            clevel: 0,
            refcount: 0,
            rdata,
            negative: None,
        }
    }

    /// Authoritative data belonging to `zone`, whose apex has `clevel` labels.
    pub fn zone_data(
        zone: ZoneId,
        clevel: u8,
        class: RecordClass,
        record_type: RecordType,
        ttl: u32,
        rdata: RData,
    ) -> Self {
        Self {
            zone,
            class,
            record_type,
            ttl,
            expires_at_secs: 0,
            flags: RecordFlags::NONE,
            credibility: Credibility::Zone,
            security: SecurityState::Unchecked,
            clevel,
            refcount: 0,
            rdata,
            negative: None,
        }
    }

    pub fn with_flags(mut self, flags: RecordFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_negative(mut self, negative: NegativeInfo) -> Self {
        self.negative = Some(negative);
        self
    }

    pub fn is_cache(&self) -> bool {
        self.zone == ZoneId::CACHE
    }

    pub fn is_hint(&self) -> bool {
        self.flags.contains(RecordFlags::HINT)
    }

    pub fn is_active(&self) -> bool {
        self.flags.contains(RecordFlags::ACTIVE)
    }

    pub fn is_negative(&self) -> bool {
        self.negative.is_some()
    }

    pub fn is_nxdomain(&self) -> bool {
        matches!(
            self.negative,
            Some(NegativeInfo {
                kind: NegativeKind::NxDomain,
                ..
            })
        )
    }

    /// TTL to put on the wire at `now_secs`.
    pub fn ttl_at(&self, now_secs: u64) -> u32 {
        if self.is_cache() && !self.is_hint() {
            u32::try_from(self.expires_at_secs.saturating_sub(now_secs)).unwrap_or(u32::MAX)
        } else {
            self.ttl
        }
    }

    /// Same class, type, negative marker and data.
    pub fn same_content(&self, other: &StoredRecord) -> bool {
        self.class == other.class
            && self.record_type == other.record_type
            && self.negative == other.negative
            && self.rdata == other.rdata
    }
}
