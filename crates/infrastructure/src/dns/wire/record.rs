use super::rdata;
use super::record_type_map::RecordTypeMapper;
use hickory_proto::rr::{RData, Record};
use lodestone_dns_domain::{DomainName, RecordClass, RecordType};
use std::fmt;

/// A resource record in transit: read from a message or about to be
/// written to one.
#[derive(Clone, PartialEq, Eq)]
pub struct WireRecord {
    pub name: DomainName,
    pub record_type: RecordType,
    pub class: RecordClass,
    pub ttl: u32,
    pub rdata: RData,
}

impl WireRecord {
    /// The type is taken from `rdata`.
    pub fn new(name: DomainName, class: RecordClass, ttl: u32, rdata: RData) -> Self {
        Self {
            name,
            record_type: RecordTypeMapper::from_hickory(rdata.record_type()),
            class,
            ttl,
            rdata,
        }
    }

    pub fn from_hickory(record: &Record) -> Self {
        Self {
            name: DomainName::from(record.name().clone()),
            record_type: RecordTypeMapper::from_hickory(record.record_type()),
            class: RecordTypeMapper::class_from_hickory(record.dns_class()),
            ttl: record.ttl(),
            rdata: record.data().clone(),
        }
    }

    pub fn to_hickory(&self) -> Record {
        let mut record = Record::from_rdata(self.name.as_hickory().clone(), self.ttl, self.rdata.clone());
        record.set_dns_class(RecordTypeMapper::class_to_hickory(self.class));
        record
    }

    /// Same owner, type, class and data. TTL is ignored and embedded names
    /// compare case-insensitively.
    pub fn same_data(&self, other: &WireRecord) -> bool {
        self.name == other.name
            && self.record_type == other.record_type
            && self.class == other.class
            && self.rdata == other.rdata
    }

    /// The name this CNAME (or NS, PTR) points at.
    pub fn target_name(&self) -> Option<DomainName> {
        rdata::first_name(&self.rdata)
    }
}

impl fmt::Debug for WireRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.name, self.ttl, self.class, self.record_type, self.rdata
        )
    }
}
