use crate::dns_name::DomainName;
use crate::dns_record::{RecordClass, RecordType};
use std::fmt;

/// A question: name, type and class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DnsQuery {
    pub name: DomainName,
    pub record_type: RecordType,
    pub record_class: RecordClass,
}

impl DnsQuery {
    pub fn new(name: DomainName, record_type: RecordType) -> Self {
        Self {
            name,
            record_type,
            record_class: RecordClass::IN,
        }
    }

    pub fn with_class(name: DomainName, record_type: RecordType, record_class: RecordClass) -> Self {
        Self {
            name,
            record_type,
            record_class,
        }
    }

    /// Same type and class, different owner. Used when a CNAME redirects
    /// the question.
    pub fn retarget(&self, name: DomainName) -> Self {
        Self {
            name,
            record_type: self.record_type,
            record_class: self.record_class,
        }
    }
}

impl fmt::Display for DnsQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.record_class, self.record_type)
    }
}
