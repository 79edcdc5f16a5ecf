use crate::dns::cache::{NameStore, NameTree, RecordFlags, StoredRecord, Table};
use crate::dns::cache_updater::CacheUpdater;
use crate::dns::forwarding::addresses_of;
use crate::dns::wire::rdata::{address_rdata, first_name, ns_rdata};
use crate::dns::wire::ParsedMessage;
use hickory_proto::rr::RData;
use lodestone_dns_domain::{Credibility, DomainError, DomainName, RecordClass, RecordType, ResolverConfig};
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// TTL given to hint records.
pub const HINT_TTL: u32 = 518_400;

/// Root server hints taken from configuration.
pub struct RootHints {
    servers: Vec<(DomainName, IpAddr)>,
    min_root_servers: usize,
}

impl RootHints {
    pub fn from_config(config: &ResolverConfig) -> Result<Self, DomainError> {
        let mut servers = Vec::with_capacity(config.root_hints.len());
        for hint in &config.root_hints {
            let name: DomainName = hint.name.parse()?;
            let address: IpAddr = hint
                .address
                .parse()
                .map_err(|_| DomainError::ConfigError(format!("bad root hint address '{}'", hint.address)))?;
            servers.push((name, address));
        }
        Ok(Self {
            servers,
            min_root_servers: config.min_root_servers,
        })
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Writes the hints into the main table as hint-flagged records; the
    /// updater mirrors them into the hints table.
    pub fn load(&self, store: &mut NameStore, updater: &CacheUpdater, now_secs: u64) -> Result<(), DomainError> {
        if self.servers.is_empty() {
            return Ok(());
        }
        let mut ns_names: Vec<&DomainName> = Vec::new();
        for (name, _) in &self.servers {
            if !ns_names.contains(&name) {
                ns_names.push(name);
            }
        }
        let ns_set = ns_names
            .iter()
            .map(|name| hint(RecordType::NS, ns_rdata(name), now_secs))
            .collect();
        updater.commit_rrset(store, Table::Main, &DomainName::root(), ns_set, now_secs)?;

        for name in ns_names {
            for rtype in [RecordType::A, RecordType::AAAA] {
                let set: Vec<StoredRecord> = self
                    .servers
                    .iter()
                    .filter(|(n, addr)| n == name && address_type(*addr) == rtype)
                    .map(|(_, addr)| hint(rtype, address_rdata(*addr), now_secs))
                    .collect();
                if !set.is_empty() {
                    updater.commit_rrset(store, Table::Main, name, set, now_secs)?;
                }
            }
        }
        info!(servers = self.servers.len(), "Root hints loaded");
        Ok(())
    }

    /// Number of root servers confirmed by a priming response: named both
    /// in the answer and in the hints, with an address from either.
    pub fn confirmed(&self, store: &NameStore, msg: &ParsedMessage, now_secs: u64) -> usize {
        let hinted: Vec<DomainName> = store
            .matching_records(Table::Hints, NameTree::ROOT, RecordClass::IN, RecordType::NS, now_secs)
            .into_iter()
            .filter_map(|id| first_name(&store.record(id).rdata))
            .collect();

        let mut confirmed: Vec<DomainName> = Vec::new();
        for record in &msg.answers {
            if record.record_type != RecordType::NS || !record.name.is_root() {
                continue;
            }
            let Some(server) = record.target_name() else {
                continue;
            };
            if !hinted.contains(&server) || confirmed.contains(&server) {
                continue;
            }
            let has_address = msg
                .additional
                .iter()
                .any(|r| r.name == server && r.record_type.is_address())
                || !addresses_of(store, Table::Hints, &server, RecordClass::IN, now_secs).is_empty();
            if has_address {
                confirmed.push(server);
            } else {
                debug!(server = %server, "Root server without address in priming answer");
            }
        }
        confirmed.len()
    }

    /// True when `confirmed` root servers are enough to trust the root NS set.
    pub fn accept(&self, confirmed: usize) -> bool {
        if confirmed < self.min_root_servers {
            warn!(
                confirmed,
                required = self.min_root_servers,
                "Priming answer names too few known root servers"
            );
            return false;
        }
        info!(confirmed, "Root servers primed");
        true
    }
}

fn hint(record_type: RecordType, rdata: RData, now_secs: u64) -> StoredRecord {
    StoredRecord::cached(RecordClass::IN, record_type, HINT_TTL, rdata, Credibility::Cache, now_secs)
        .with_flags(RecordFlags::HINT)
}

fn address_type(addr: IpAddr) -> RecordType {
    match addr {
        IpAddr::V4(_) => RecordType::A,
        IpAddr::V6(_) => RecordType::AAAA,
    }
}
