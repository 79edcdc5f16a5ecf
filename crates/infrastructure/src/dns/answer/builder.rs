use super::ordering::{covered_type, order_rrset, signatures_last};
use crate::dns::cache::{NameStore, NameTree, NodeId, RecordId, StoredRecord, Table, ZoneId};
use crate::dns::wire::rdata::{additional_target, first_name};
use crate::dns::wire::{soa_of, ResponseSections, WireRecord, DEFAULT_UDP_SIZE};
use lodestone_dns_domain::{
    AnswerConfig, DnsQuery, DomainError, DomainName, RecordClass, RecordType, ResponseCode,
};
use tracing::debug;

/// How a client question was resolved from local data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// Answered from zone data.
    Authoritative,
    /// Answered, at least partly, from the cache.
    Cached,
    /// The name does not exist in a zone we serve.
    AuthoritativeNxDomain,
    /// A cached NXDOMAIN or NODATA entry applies.
    NegativeCached,
    /// Pointed the client at closer servers.
    Referral,
    /// Must be resolved upstream. `question` is where local data ran out and
    /// `chain` the CNAMEs followed to get there.
    ForwardRequired {
        question: DnsQuery,
        chain: Vec<WireRecord>,
    },
    /// CNAME chain ceiling crossed.
    ServerFailure,
}

impl AnswerOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerOutcome::Authoritative => "authoritative",
            AnswerOutcome::Cached => "cached",
            AnswerOutcome::AuthoritativeNxDomain => "authoritative-nxdomain",
            AnswerOutcome::NegativeCached => "negative-cached",
            AnswerOutcome::Referral => "referral",
            AnswerOutcome::ForwardRequired { .. } => "forward-required",
            AnswerOutcome::ServerFailure => "server-failure",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub outcome: AnswerOutcome,
    pub rcode: ResponseCode,
    pub authoritative: bool,
    pub sections: ResponseSections,
}

impl Answer {
    fn new(outcome: AnswerOutcome, rcode: ResponseCode, authoritative: bool, sections: ResponseSections) -> Self {
        Self {
            outcome,
            rcode,
            authoritative,
            sections,
        }
    }
}

/// Builds client responses by walking the name store.
pub struct AnswerBuilder {
    config: AnswerConfig,
    max_cname_chain: usize,
}

impl AnswerBuilder {
    pub fn new(config: &AnswerConfig, max_cname_chain: usize) -> Self {
        Self {
            config: config.clone(),
            max_cname_chain,
        }
    }

    /// Response size limit for a client that advertised `edns_size`.
    pub fn response_limit(&self, edns_size: Option<u16>) -> usize {
        match edns_size {
            Some(size) => usize::from(size)
                .max(DEFAULT_UDP_SIZE)
                .min(usize::from(self.config.max_udp_size.max(DEFAULT_UDP_SIZE as u16))),
            None => DEFAULT_UDP_SIZE,
        }
    }

    /// Answers `question` from local data. With `recursion` set, anything
    /// not held locally comes back as `ForwardRequired`.
    pub fn answer(
        &self,
        store: &mut NameStore,
        question: &DnsQuery,
        recursion: bool,
        now_secs: u64,
    ) -> Result<Answer, DomainError> {
        let class = question.record_class;
        let rtype = question.record_type;
        let mut sections = ResponseSections::default();
        let mut name = question.name.clone();
        let mut all_zone = true;
        let mut chain_len = 0usize;

        loop {
            let zone = self.serving_zone(store, &name, class, now_secs);
            let node = store.find_exact(Table::Main, &name);

            if let Some(node) = node {
                let live = store.live_records(Table::Main, node, now_secs);

                let data: Vec<RecordId> = live
                    .iter()
                    .copied()
                    .filter(|&id| {
                        let r = store.record(id);
                        !r.is_negative()
                            && class.matches(r.class)
                            && rtype.matches(r.record_type)
                            && (rtype.is_signature() || rtype == RecordType::ANY || !r.record_type.is_signature())
                    })
                    .collect();
                if !data.is_empty() {
                    all_zone &= data.iter().all(|&id| !store.record(id).is_cache());
                    self.push_data(store, node, &name, data, &live, rtype, now_secs, &mut sections.answers);
                    self.add_additional(store, &mut sections, class, now_secs);
                    let outcome = if all_zone {
                        AnswerOutcome::Authoritative
                    } else {
                        AnswerOutcome::Cached
                    };
                    debug!(name = %question.name, outcome = outcome.as_str(), answers = sections.answers.len(), "Answered from store");
                    return Ok(Answer::new(outcome, ResponseCode::NoError, all_zone, sections));
                }

                if rtype != RecordType::CNAME {
                    let cname = live.iter().copied().find(|&id| {
                        let r = store.record(id);
                        !r.is_negative() && r.record_type == RecordType::CNAME && class.matches(r.class)
                    });
                    if let Some(id) = cname {
                        if chain_len >= self.max_cname_chain {
                            debug!(name = %question.name, "Local CNAME chain too long");
                            return Ok(Answer::new(
                                AnswerOutcome::ServerFailure,
                                ResponseCode::ServFail,
                                false,
                                ResponseSections::default(),
                            ));
                        }
                        let record = store.record(id);
                        let Some(target) = first_name(&record.rdata) else {
                            return Err(DomainError::MalformedMessage(format!("bad CNAME stored at {}", name)));
                        };
                        all_zone &= !record.is_cache();
                        sections.answers.push(to_wire(&name, record, now_secs));
                        chain_len += 1;
                        name = target;
                        continue;
                    }
                }

                let negative = live.iter().copied().find(|&id| {
                    let r = store.record(id);
                    class.matches(r.class) && (r.is_nxdomain() || (r.is_negative() && r.record_type == rtype))
                });
                if let Some(id) = negative {
                    let record = store.record(id);
                    let rcode = if record.is_nxdomain() {
                        ResponseCode::NxDomain
                    } else {
                        ResponseCode::NoError
                    };
                    if let Some(info) = &record.negative {
                        sections.authority.push(WireRecord::new(
                            info.soa_owner.clone(),
                            record.class,
                            record.ttl_at(now_secs),
                            record.rdata.clone(),
                        ));
                    }
                    return Ok(Answer::new(AnswerOutcome::NegativeCached, rcode, false, sections));
                }

                if let Some((_, origin)) = &zone {
                    self.push_zone_soa(store, origin, class, now_secs, &mut sections.authority);
                    return Ok(Answer::new(AnswerOutcome::Authoritative, ResponseCode::NoError, all_zone, sections));
                }
            } else if let Some((_, origin)) = &zone {
                self.push_zone_soa(store, origin, class, now_secs, &mut sections.authority);
                return Ok(Answer::new(
                    AnswerOutcome::AuthoritativeNxDomain,
                    ResponseCode::NxDomain,
                    all_zone,
                    sections,
                ));
            }

            if recursion {
                let chain = std::mem::take(&mut sections.answers);
                return Ok(Answer::new(
                    AnswerOutcome::ForwardRequired {
                        question: question.retarget(name),
                        chain,
                    },
                    ResponseCode::NoError,
                    false,
                    ResponseSections::default(),
                ));
            }

            self.push_referral(store, &name, class, now_secs, &mut sections);
            return Ok(Answer::new(AnswerOutcome::Referral, ResponseCode::NoError, false, sections));
        }
    }

    /// Zone we answer for at `name`, unless a delegation inside it takes
    /// `name` out of our authority.
    fn serving_zone(
        &self,
        store: &NameStore,
        name: &DomainName,
        class: RecordClass,
        now_secs: u64,
    ) -> Option<(ZoneId, DomainName)> {
        let zone = store.zones().find_authoritative(name, class, now_secs)?;
        let (id, origin) = (zone.id, zone.origin.clone());
        let apex_depth = origin.label_count();
        let tree = store.tree(Table::Main);
        let (mut node, matched) = store.lookup(Table::Main, name);
        let mut depth = matched;
        while depth > apex_depth {
            let delegated = store.live_records(Table::Main, node, now_secs).iter().any(|&rid| {
                let r = store.record(rid);
                r.record_type == RecordType::NS && r.zone == id && !r.is_negative()
            });
            if delegated {
                return None;
            }
            match tree.parent(node) {
                Some(parent) => node = parent,
                None => break,
            }
            depth -= 1;
        }
        Some((id, origin))
    }

    #[allow(clippy::too_many_arguments)]
    fn push_data(
        &self,
        store: &mut NameStore,
        node: NodeId,
        owner: &DomainName,
        data: Vec<RecordId>,
        live: &[RecordId],
        rtype: RecordType,
        now_secs: u64,
        out: &mut Vec<WireRecord>,
    ) {
        // One RRset per (class, type), in order of first appearance.
        let mut sets: Vec<((RecordClass, RecordType), Vec<RecordId>)> = Vec::new();
        for id in data {
            let r = store.record(id);
            let key = (r.class, r.record_type);
            match sets.iter_mut().find(|(k, _)| *k == key) {
                Some((_, ids)) => ids.push(id),
                None => sets.push((key, vec![id])),
            }
        }

        let mut records = Vec::new();
        for ((class, set_type), ids) in sets {
            let order = self.config.order_for(class, set_type, owner);
            for id in order_rrset(store, node, ids, order) {
                records.push(to_wire(owner, store.record(id), now_secs));
            }
            if !rtype.is_signature() && rtype != RecordType::ANY {
                for &id in live {
                    let r = store.record(id);
                    if r.record_type.is_signature()
                        && r.class == class
                        && covered_type(&r.rdata) == Some(set_type)
                    {
                        records.push(to_wire(owner, r, now_secs));
                    }
                }
            }
        }
        signatures_last(&mut records, |r| r.record_type);
        out.extend(records);
    }

    fn push_zone_soa(
        &self,
        store: &NameStore,
        origin: &DomainName,
        class: RecordClass,
        now_secs: u64,
        out: &mut Vec<WireRecord>,
    ) {
        let Some(apex) = store.find_exact(Table::Main, origin) else {
            return;
        };
        for id in store.matching_records(Table::Main, apex, class, RecordType::SOA, now_secs) {
            let record = store.record(id);
            if record.is_negative() {
                continue;
            }
            let mut wire = to_wire(origin, record, now_secs);
            if let Some(soa) = soa_of(&record.rdata) {
                wire.ttl = wire.ttl.min(soa.minimum());
            }
            out.push(wire);
        }
    }

    /// NS set of the closest enclosing cut, from the main table or else the
    /// root hints, with whatever glue is known.
    fn push_referral(
        &self,
        store: &NameStore,
        name: &DomainName,
        class: RecordClass,
        now_secs: u64,
        sections: &mut ResponseSections,
    ) {
        let (mut node, _) = store.lookup(Table::Main, name);
        let mut found = None;
        loop {
            let ns: Vec<RecordId> = store
                .matching_records(Table::Main, node, class, RecordType::NS, now_secs)
                .into_iter()
                .filter(|&id| !store.record(id).is_negative())
                .collect();
            if !ns.is_empty() {
                found = Some((Table::Main, node, ns));
                break;
            }
            match store.tree(Table::Main).parent(node) {
                Some(parent) => node = parent,
                None => break,
            }
        }
        let (table, node, ns) = match found {
            Some(found) => found,
            None => {
                let ns = store.matching_records(Table::Hints, NameTree::ROOT, class, RecordType::NS, now_secs);
                (Table::Hints, NameTree::ROOT, ns)
            }
        };
        let Ok(owner) = store.name_of(table, node) else {
            return;
        };
        for id in ns {
            sections.authority.push(to_wire(&owner, store.record(id), now_secs));
        }
        for record in sections.authority.clone() {
            if let Some(target) = first_name(&record.rdata) {
                push_addresses(store, table, &target, class, now_secs, &mut sections.additional);
            }
        }
    }

    /// Addresses of names the answer points at (NS, MX, SRV targets).
    fn add_additional(&self, store: &NameStore, sections: &mut ResponseSections, class: RecordClass, now_secs: u64) {
        let targets: Vec<DomainName> = sections
            .answers
            .iter()
            .filter_map(|r| additional_target(&r.rdata))
            .collect();
        for target in targets {
            push_addresses(store, Table::Main, &target, class, now_secs, &mut sections.additional);
        }
    }
}

fn push_addresses(
    store: &NameStore,
    table: Table,
    target: &DomainName,
    class: RecordClass,
    now_secs: u64,
    out: &mut Vec<WireRecord>,
) {
    let Some(node) = store.find_exact(table, target) else {
        return;
    };
    for rtype in [RecordType::A, RecordType::AAAA] {
        for id in store.matching_records(table, node, class, rtype, now_secs) {
            let record = store.record(id);
            if record.is_negative() {
                continue;
            }
            let wire = to_wire(target, record, now_secs);
            if !out.iter().any(|existing| existing.same_data(&wire)) {
                out.push(wire);
            }
        }
    }
}

fn to_wire(owner: &DomainName, record: &StoredRecord, now_secs: u64) -> WireRecord {
    WireRecord::new(
        owner.clone(),
        record.class,
        record.ttl_at(now_secs),
        record.rdata.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::cache::{NegativeInfo, NegativeKind, StoredRecord, ZoneKind};
    use crate::dns::wire::rdata::{address_rdata, cname_rdata, ns_rdata};
    use hickory_proto::rr::rdata::SOA;
    use hickory_proto::rr::RData;
    use lodestone_dns_domain::{Credibility, RrsetOrder};
    use std::net::Ipv4Addr;

    fn name(s: &str) -> DomainName {
        s.parse().unwrap()
    }

    fn builder() -> AnswerBuilder {
        let config = AnswerConfig {
            default_order: RrsetOrder::Fixed,
            ..AnswerConfig::default()
        };
        AnswerBuilder::new(&config, 8)
    }

    fn put(store: &mut NameStore, owner: &str, record: StoredRecord) {
        let node = store.find_or_create(Table::Main, &name(owner));
        store.insert_record(Table::Main, node, record).unwrap();
    }

    fn cached(rtype: RecordType, rdata: RData) -> StoredRecord {
        StoredRecord::cached(RecordClass::IN, rtype, 300, rdata, Credibility::AuthAnswer, 0)
    }

    fn a(last_octet: u8) -> RData {
        address_rdata(Ipv4Addr::new(192, 0, 2, last_octet).into())
    }

    fn soa_rdata() -> RData {
        RData::SOA(SOA::new(
            name("ns1.example.com.").into_hickory(),
            name("hostmaster.example.com.").into_hickory(),
            1,
            3600,
            600,
            86400,
            60,
        ))
    }

    #[test]
    fn test_cached_answer_follows_cname() {
        let mut store = NameStore::new();
        put(&mut store, "www.example.com.", cached(RecordType::CNAME, cname_rdata(&name("web.example.com."))));
        put(&mut store, "web.example.com.", cached(RecordType::A, a(7)));

        let question = DnsQuery::new(name("www.example.com."), RecordType::A);
        let answer = builder().answer(&mut store, &question, true, 10).unwrap();
        assert_eq!(answer.outcome, AnswerOutcome::Cached);
        assert_eq!(answer.rcode, ResponseCode::NoError);
        assert!(!answer.authoritative);
        assert_eq!(answer.sections.answers.len(), 2);
        assert_eq!(answer.sections.answers[0].record_type, RecordType::CNAME);
        assert_eq!(answer.sections.answers[1].ttl, 290);
    }

    #[test]
    fn test_missing_data_requires_forwarding_from_chain_end() {
        let mut store = NameStore::new();
        put(&mut store, "www.example.com.", cached(RecordType::CNAME, cname_rdata(&name("cdn.example.net."))));

        let question = DnsQuery::new(name("www.example.com."), RecordType::A);
        let answer = builder().answer(&mut store, &question, true, 0).unwrap();
        match answer.outcome {
            AnswerOutcome::ForwardRequired { question, chain } => {
                assert_eq!(question.name, name("cdn.example.net."));
                assert_eq!(chain.len(), 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_cname_loop_hits_chain_limit() {
        let mut store = NameStore::new();
        put(&mut store, "a.example.com.", cached(RecordType::CNAME, cname_rdata(&name("b.example.com."))));
        put(&mut store, "b.example.com.", cached(RecordType::CNAME, cname_rdata(&name("a.example.com."))));

        let question = DnsQuery::new(name("a.example.com."), RecordType::A);
        let answer = builder().answer(&mut store, &question, true, 0).unwrap();
        assert_eq!(answer.outcome, AnswerOutcome::ServerFailure);
        assert_eq!(answer.rcode, ResponseCode::ServFail);
    }

    #[test]
    fn test_negative_entry_answers_with_soa() {
        let mut store = NameStore::new();
        let entry = StoredRecord::cached(RecordClass::IN, RecordType::ANY, 60, soa_rdata(), Credibility::AuthAnswer, 0)
            .with_negative(NegativeInfo {
                kind: NegativeKind::NxDomain,
                soa_owner: name("example.com."),
            });
        put(&mut store, "gone.example.com.", entry);

        let question = DnsQuery::new(name("gone.example.com."), RecordType::MX);
        let answer = builder().answer(&mut store, &question, true, 0).unwrap();
        assert_eq!(answer.outcome, AnswerOutcome::NegativeCached);
        assert_eq!(answer.rcode, ResponseCode::NxDomain);
        assert_eq!(answer.sections.authority.len(), 1);
        assert_eq!(answer.sections.authority[0].name, name("example.com."));
    }

    #[test]
    fn test_zone_answers_and_nxdomain() {
        let mut store = NameStore::new();
        let zone = store
            .zones_mut()
            .add(name("example.com."), RecordClass::IN, ZoneKind::Master, 0, 0);
        put(&mut store, "example.com.", StoredRecord::zone_data(zone, 2, RecordClass::IN, RecordType::SOA, 3600, soa_rdata()));
        put(&mut store, "host.example.com.", StoredRecord::zone_data(zone, 2, RecordClass::IN, RecordType::A, 3600, a(1)));

        let b = builder();
        let hit = b
            .answer(&mut store, &DnsQuery::new(name("host.example.com."), RecordType::A), false, 0)
            .unwrap();
        assert_eq!(hit.outcome, AnswerOutcome::Authoritative);
        assert!(hit.authoritative);

        let nodata = b
            .answer(&mut store, &DnsQuery::new(name("host.example.com."), RecordType::MX), false, 0)
            .unwrap();
        assert_eq!(nodata.outcome, AnswerOutcome::Authoritative);
        assert!(nodata.sections.answers.is_empty());
        assert_eq!(nodata.sections.authority[0].ttl, 60);

        let missing = b
            .answer(&mut store, &DnsQuery::new(name("nope.example.com."), RecordType::A), true, 0)
            .unwrap();
        assert_eq!(missing.outcome, AnswerOutcome::AuthoritativeNxDomain);
        assert_eq!(missing.rcode, ResponseCode::NxDomain);
    }

    #[test]
    fn test_referral_without_recursion() {
        let mut store = NameStore::new();
        put(&mut store, "example.com.", cached(RecordType::NS, ns_rdata(&name("ns1.example.com."))));
        put(&mut store, "ns1.example.com.", cached(RecordType::A, a(53)));

        let question = DnsQuery::new(name("www.example.com."), RecordType::A);
        let answer = builder().answer(&mut store, &question, false, 0).unwrap();
        assert_eq!(answer.outcome, AnswerOutcome::Referral);
        assert_eq!(answer.sections.authority.len(), 1);
        assert_eq!(answer.sections.additional.len(), 1);
    }

    #[test]
    fn test_response_limit() {
        let b = builder();
        assert_eq!(b.response_limit(None), 512);
        assert_eq!(b.response_limit(Some(100)), 512);
        assert_eq!(b.response_limit(Some(1232)), 1232);
        assert_eq!(b.response_limit(Some(65000)), 4096);
    }
}
