use lodestone_dns_domain::{Credibility, DomainName, RecordClass, RecordType, SecurityState};

/// A stored record as seen by dump and statistics collaborators.
#[derive(Debug, Clone, Copy)]
pub struct VisitedRecord<'a> {
    pub owner: &'a DomainName,
    pub zone: u16,
    pub class: RecordClass,
    pub record_type: RecordType,
    /// Remaining TTL for cached data, configured TTL for zone data.
    pub ttl: u32,
    pub credibility: Credibility,
    pub security: SecurityState,
    pub hint: bool,
    pub negative: bool,
    /// Record data in presentation format.
    pub rdata: &'a str,
}

pub trait RecordVisitor {
    fn visit(&mut self, record: &VisitedRecord<'_>);
}
