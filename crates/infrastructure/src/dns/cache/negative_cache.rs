use super::record::{NegativeInfo, NegativeKind, StoredRecord};
use crate::dns::wire::{soa_of, WireRecord};
use lodestone_dns_domain::{CacheConfig, Credibility, DnsQuery, DomainError, RecordType};
use tracing::debug;

/// Turns NXDOMAIN and NODATA answers into cache entries.
///
/// An NXDOMAIN entry is stored with type ANY so it shadows every type at
/// the owner; a NODATA entry carries the queried type. Both keep the SOA
/// rdata that justified them so it can be served in the authority section.
pub struct NegativeCache {
    max_negative_ttl: u32,
}

impl NegativeCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            max_negative_ttl: config.max_negative_ttl,
        }
    }

    /// TTL of a negative entry backed by `soa`: the smaller of the SOA's
    /// own TTL and its MINIMUM field, never above the configured ceiling.
    pub fn negative_ttl(&self, soa: &WireRecord) -> Result<u32, DomainError> {
        let data = soa_of(&soa.rdata)
            .ok_or_else(|| DomainError::MalformedMessage(format!("no SOA data at {}", soa.name)))?;
        Ok(soa.ttl.min(data.minimum()).min(self.max_negative_ttl))
    }

    pub fn build_entry(
        &self,
        kind: NegativeKind,
        question: &DnsQuery,
        soa: &WireRecord,
        credibility: Credibility,
        now_secs: u64,
    ) -> Result<StoredRecord, DomainError> {
        if soa.record_type != RecordType::SOA {
            return Err(DomainError::MalformedMessage(format!(
                "negative answer backed by {} instead of SOA",
                soa.record_type
            )));
        }
        let ttl = self.negative_ttl(soa)?;
        let record_type = match kind {
            NegativeKind::NxDomain => RecordType::ANY,
            NegativeKind::NoData => question.record_type,
        };
        debug!(
            name = %question.name,
            kind = kind.as_str(),
            soa = %soa.name,
            ttl,
            "Building negative cache entry"
        );
        Ok(StoredRecord::cached(
            question.record_class,
            record_type,
            ttl,
            soa.rdata.clone(),
            credibility,
            now_secs,
        )
        .with_negative(NegativeInfo {
            kind,
            soa_owner: soa.name.clone(),
        }))
    }
}
