use super::query::{Candidate, Query, QueryState};
use super::server_stats::ServerStats;
use crate::dns::cache::{NameStore, NameTree, NodeId, RecordId, Table};
use crate::dns::wire::rdata::{address_from_rdata, first_name};
use crate::dns::wire::{MessageBuilder, UPSTREAM_EDNS_SIZE};
use lodestone_dns_application::ports::Transport;
use lodestone_dns_domain::{DomainError, DomainName, RecordClass, RecordType, ResolverConfig};
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, warn};

const MIN_TIMEOUT_MS: u64 = 4_000;
const MAX_TIMEOUT_MS: u64 = 45_000;
const DNS_PORT: u16 = 53;

/// Servers a query may use, with the zone they serve.
#[derive(Debug, Default)]
pub struct CandidateSet {
    pub candidates: Vec<Candidate>,
    pub zone_cut: DomainName,
    /// NS records the candidates were derived from.
    pub held: Vec<RecordId>,
    /// NS names at the cut with no known address.
    pub missing: Vec<DomainName>,
}

/// Chooses upstream servers and sends queries to them.
pub struct Forwarder {
    forwarders: Vec<SocketAddr>,
    forward_only: bool,
    max_retries_per_server: u8,
    query_lifetime_ms: u64,
    max_cname_chain: usize,
    max_subqueries: usize,
}

impl Forwarder {
    pub fn new(config: &ResolverConfig) -> Result<Self, DomainError> {
        let forwarders = config
            .forwarder_addrs()
            .map_err(|e| DomainError::ConfigError(e.to_string()))?;
        Ok(Self {
            forwarders,
            forward_only: config.forward_only,
            max_retries_per_server: config.max_retries_per_server.max(1),
            query_lifetime_ms: config.query_lifetime_secs * 1000,
            max_cname_chain: config.max_cname_chain,
            max_subqueries: config.max_subqueries,
        })
    }

    pub fn has_forwarders(&self) -> bool {
        !self.forwarders.is_empty()
    }

    pub fn forward_only(&self) -> bool {
        self.forward_only
    }

    pub fn query_lifetime_ms(&self) -> u64 {
        self.query_lifetime_ms
    }

    pub fn max_cname_chain(&self) -> usize {
        self.max_cname_chain
    }

    pub fn forwarder_candidates(&self) -> CandidateSet {
        CandidateSet {
            candidates: self
                .forwarders
                .iter()
                .map(|&addr| Candidate::new(addr, None))
                .collect(),
            zone_cut: DomainName::root(),
            ..CandidateSet::default()
        }
    }

    /// Servers of the closest enclosing zone whose NS set is cached,
    /// falling back to the root hints.
    pub fn iterative_candidates(
        &self,
        store: &NameStore,
        stats: &ServerStats,
        name: &DomainName,
        class: RecordClass,
        now_secs: u64,
    ) -> Result<CandidateSet, DomainError> {
        let (mut node, _) = store.lookup(Table::Main, name);
        loop {
            let set = self.candidates_at(store, stats, Table::Main, node, class, now_secs)?;
            if !set.candidates.is_empty() || !set.missing.is_empty() {
                return Ok(set);
            }
            match store.tree(Table::Main).parent(node) {
                Some(parent) => node = parent,
                None => break,
            }
        }
        self.hint_candidates(store, stats, class, now_secs)
    }

    pub fn hint_candidates(
        &self,
        store: &NameStore,
        stats: &ServerStats,
        class: RecordClass,
        now_secs: u64,
    ) -> Result<CandidateSet, DomainError> {
        let mut set = self.candidates_at(store, stats, Table::Hints, NameTree::ROOT, class, now_secs)?;
        // Hint NS names without hint addresses are of no use.
        set.missing.clear();
        set.held.clear();
        Ok(set)
    }

    fn candidates_at(
        &self,
        store: &NameStore,
        stats: &ServerStats,
        table: Table,
        node: NodeId,
        class: RecordClass,
        now_secs: u64,
    ) -> Result<CandidateSet, DomainError> {
        let ns_records: Vec<RecordId> = store
            .matching_records(table, node, class, RecordType::NS, now_secs)
            .into_iter()
            .filter(|&id| !store.record(id).is_negative())
            .collect();
        if ns_records.is_empty() {
            return Ok(CandidateSet::default());
        }
        let zone_cut = store.name_of(table, node)?;
        let mut set = CandidateSet {
            zone_cut,
            held: ns_records.clone(),
            ..CandidateSet::default()
        };
        for id in ns_records {
            let Some(ns_name) = first_name(&store.record(id).rdata) else {
                continue;
            };
            let addresses = addresses_of(store, table, &ns_name, class, now_secs);
            if addresses.is_empty() {
                set.missing.push(ns_name);
                continue;
            }
            for ip in addresses {
                if stats.is_lame(ip, &set.zone_cut) {
                    debug!(server = %ip, zone = %set.zone_cut, "Skipping lame server");
                    continue;
                }
                let addr = SocketAddr::new(ip, DNS_PORT);
                if set.candidates.iter().all(|c| c.addr != addr) {
                    set.candidates.push(Candidate::new(addr, Some(ns_name.clone())));
                }
            }
        }
        if set.candidates.is_empty() && set.missing.is_empty() {
            set.held.clear();
        }
        Ok(set)
    }

    /// Best candidate not marked bad and under its send budget: fewest
    /// sends first, then rank.
    pub fn next_candidate(&self, query: &Query, stats: &mut ServerStats) -> Option<usize> {
        query
            .candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.bad && c.sends < self.max_retries_per_server)
            .map(|(i, c)| (i, (c.sends, stats.rank_key(c.addr.ip()))))
            .min_by_key(|(_, key)| *key)
            .map(|(i, _)| i)
    }

    /// Retry timeout after `previous_sends` earlier sends to a server.
    pub fn timeout_ms(rtt_ms: u32, previous_sends: u8) -> u64 {
        let base = MIN_TIMEOUT_MS.max(2 * u64::from(rtt_ms));
        if previous_sends >= 16 {
            return MAX_TIMEOUT_MS;
        }
        (base << previous_sends).min(MAX_TIMEOUT_MS)
    }

    /// Sends the query to the next usable candidate. Returns the retry
    /// deadline, or `ServerUnreachable` when no candidate is left.
    pub fn send(
        &self,
        query: &mut Query,
        transport: &dyn Transport,
        stats: &mut ServerStats,
        now_ms: u64,
    ) -> Result<u64, DomainError> {
        let bytes = MessageBuilder::build_query(
            query.upstream_id,
            &query.question,
            query.forwarding,
            Some(UPSTREAM_EDNS_SIZE),
        )?;
        loop {
            let Some(index) = self.next_candidate(query, stats) else {
                debug!(query = %query.id, question = %query.question, "No usable server left");
                return Err(DomainError::ServerUnreachable);
            };
            query.via_stream = false;
            let addr = query.candidates[index].addr;
            if let Err(e) = transport.send_datagram(addr, &bytes) {
                warn!(server = %addr, error = %e, "Send failed");
                query.candidates[index].bad = true;
                continue;
            }
            return Ok(self.mark_sent(query, index, stats, now_ms));
        }
    }

    /// Repeats the last exchange over the stream transport after a
    /// truncated reply.
    pub fn resend_stream(
        &self,
        query: &mut Query,
        transport: &dyn Transport,
        stats: &mut ServerStats,
        now_ms: u64,
    ) -> Result<u64, DomainError> {
        let Some(index) = query.current else {
            return Err(DomainError::ServerUnreachable);
        };
        let bytes = MessageBuilder::build_query(
            query.upstream_id,
            &query.question,
            query.forwarding,
            Some(UPSTREAM_EDNS_SIZE),
        )?;
        let addr = query.candidates[index].addr;
        transport.send_stream(addr, &bytes)?;
        query.via_stream = true;
        debug!(query = %query.id, server = %addr, "Retrying over stream after truncation");
        Ok(self.mark_sent(query, index, stats, now_ms))
    }

    fn mark_sent(&self, query: &mut Query, index: usize, stats: &mut ServerStats, now_ms: u64) -> u64 {
        let candidate = &mut query.candidates[index];
        let previous = candidate.sends;
        candidate.sends = candidate.sends.saturating_add(1);
        candidate.sent_at_ms = Some(now_ms);
        let addr = candidate.addr;
        query.current = Some(index);
        query.state = QueryState::Sent;

        let timeout = Self::timeout_ms(stats.rtt(addr.ip()), previous);
        let deadline = (now_ms + timeout).min(query.expires_at_ms);
        debug!(
            query = %query.id,
            question = %query.question,
            server = %addr,
            upstream_id = query.upstream_id,
            timeout_ms = timeout,
            "Query sent"
        );
        deadline
    }

    /// Updates RTT estimates after candidate `answered` replied.
    pub fn note_answer(&self, query: &Query, answered: usize, stats: &mut ServerStats, now_ms: u64) {
        for (i, candidate) in query.candidates.iter().enumerate() {
            let ip = candidate.addr.ip();
            if i == answered {
                if let Some(sent_at) = candidate.sent_at_ms {
                    let sample = u32::try_from(now_ms.saturating_sub(sent_at)).unwrap_or(u32::MAX);
                    stats.record_answer(ip, sample);
                }
            } else if candidate.sends > 0 {
                stats.penalize(ip);
            } else {
                stats.decay(ip);
            }
        }
    }

    /// Fails once the chain or sub-query ceiling is crossed.
    pub fn check_limits(&self, query: &Query) -> Result<(), DomainError> {
        if query.chain.len() > self.max_cname_chain {
            return Err(DomainError::LoopLimitExceeded(format!(
                "CNAME chain longer than {}",
                self.max_cname_chain
            )));
        }
        if query.subqueries > self.max_subqueries {
            return Err(DomainError::LoopLimitExceeded(format!(
                "more than {} sub-queries",
                self.max_subqueries
            )));
        }
        Ok(())
    }
}

/// Addresses stored for `name` in `table`.
pub fn addresses_of(
    store: &NameStore,
    table: Table,
    name: &DomainName,
    class: RecordClass,
    now_secs: u64,
) -> Vec<IpAddr> {
    let Some(node) = store.find_exact(table, name) else {
        return Vec::new();
    };
    [RecordType::A, RecordType::AAAA]
        .into_iter()
        .flat_map(|rtype| store.matching_records(table, node, class, rtype, now_secs))
        .filter_map(|id| {
            let record = store.record(id);
            if record.is_negative() {
                return None;
            }
            address_from_rdata(&record.rdata)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_backs_off_and_caps() {
        assert_eq!(Forwarder::timeout_ms(100, 0), 4_000);
        assert_eq!(Forwarder::timeout_ms(3_000, 0), 6_000);
        assert_eq!(Forwarder::timeout_ms(100, 1), 8_000);
        assert_eq!(Forwarder::timeout_ms(100, 3), 32_000);
        assert_eq!(Forwarder::timeout_ms(100, 4), 45_000);
        assert_eq!(Forwarder::timeout_ms(100, 200), 45_000);
    }
}
