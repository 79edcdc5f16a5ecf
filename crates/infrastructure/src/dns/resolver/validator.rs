use crate::dns::answer::covered_type;
use crate::dns::cache::StoredRecord;
use crate::dns::forwarding::{Query, QueryId, QueryTracker};
use crate::dns::wire::{ParsedMessage, WireRecord};
use hickory_proto::op::{Header, MessageType};
use lodestone_dns_application::ports::SignatureVerifier;
use lodestone_dns_domain::{Credibility, DomainName, Opcode, RecordClass, RecordType, ResponseCode};
use rustc_hash::FxHashMap;
use std::net::SocketAddr;
use tracing::{debug, warn};

/// What an upstream response means for the query it answers.
#[derive(Debug, Clone)]
pub enum Verdict {
    /// Ask someone else.
    ServerFailure(String),
    /// Repeat the exchange over a stream.
    Truncated,
    /// Closer servers for `cut`.
    Referral { cut: DomainName },
    /// The server does not serve the zone it was asked about.
    Lame { cut: DomainName },
    Answer {
        final_name: DomainName,
        chain: Vec<WireRecord>,
        data: Vec<WireRecord>,
    },
    /// The chain leaves the data in this response; resolve `target` next.
    CnameRestart {
        target: DomainName,
        chain: Vec<WireRecord>,
    },
    NxDomain {
        final_name: DomainName,
        chain: Vec<WireRecord>,
        soa: Option<WireRecord>,
    },
    NoData {
        final_name: DomainName,
        chain: Vec<WireRecord>,
        soa: Option<WireRecord>,
    },
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::ServerFailure(_) => "server-failure",
            Verdict::Truncated => "truncated",
            Verdict::Referral { .. } => "referral",
            Verdict::Lame { .. } => "lame",
            Verdict::Answer { .. } => "answer",
            Verdict::CnameRestart { .. } => "cname-restart",
            Verdict::NxDomain { .. } => "nxdomain",
            Verdict::NoData { .. } => "nodata",
        }
    }
}

/// One RRset from a response, ready for `CacheUpdater::commit_rrset`.
#[derive(Debug)]
pub struct RrsetGroup {
    pub owner: DomainName,
    pub records: Vec<StoredRecord>,
}

struct Chase<'a> {
    final_name: DomainName,
    chain: Vec<&'a WireRecord>,
    data: Vec<&'a WireRecord>,
}

/// Matches upstream responses to queries and decides what they mean.
pub struct ResponseValidator {
    server_keys: FxHashMap<SocketAddr, String>,
}

impl ResponseValidator {
    pub fn new(server_keys: Vec<(SocketAddr, String)>) -> Self {
        Self {
            server_keys: server_keys.into_iter().collect(),
        }
    }

    pub fn has_keys(&self) -> bool {
        !self.server_keys.is_empty()
    }

    /// Finds the query `msg` answers and the candidate that sent it.
    /// Anything that does not match on id, source and question is ignored.
    pub fn match_query(
        &self,
        tracker: &QueryTracker,
        from: SocketAddr,
        msg: &ParsedMessage,
    ) -> Option<(QueryId, usize)> {
        let (id, index) = self.match_header(tracker, from, &msg.header)?;
        let query = tracker.get(id)?;
        match msg.question() {
            Some(question) if msg.questions.len() == 1 && *question == query.question => Some((id, index)),
            _ => {
                debug!(query = %id, server = %from, "Response question does not match, dropping");
                None
            }
        }
    }

    /// Header-only match, for responses whose body does not parse.
    pub fn match_header(
        &self,
        tracker: &QueryTracker,
        from: SocketAddr,
        header: &Header,
    ) -> Option<(QueryId, usize)> {
        if header.message_type() != MessageType::Response {
            debug!(server = %from, "Query received on upstream socket, dropping");
            return None;
        }
        let Some(id) = tracker.find_by_upstream(header.id()) else {
            debug!(server = %from, upstream_id = header.id(), "No query waiting for this id");
            return None;
        };
        let query = tracker.get(id)?;
        match query.sent_candidate(from) {
            Some(index) => Some((id, index)),
            None => {
                debug!(query = %id, server = %from, "Response from a server we did not ask");
                None
            }
        }
    }

    /// True unless `from` has a key and the response is not signed with it.
    pub fn check_signature(&self, from: SocketAddr, msg: &ParsedMessage, verifier: &dyn SignatureVerifier) -> bool {
        let Some(key) = self.server_keys.get(&from) else {
            return true;
        };
        let verified = msg
            .tsig
            .as_ref()
            .is_some_and(|tsig| verifier.verify(key, &tsig.signed_message, &tsig.mac));
        if !verified {
            warn!(server = %from, key = %key, "Response signature missing or invalid");
        }
        verified
    }

    pub fn classify(&self, query: &Query, msg: &ParsedMessage) -> Verdict {
        let rcode = msg.rcode();
        if msg.opcode() != Opcode::Query {
            return Verdict::ServerFailure(format!("unexpected opcode {:?}", msg.opcode()));
        }
        if rcode.is_server_failure() {
            return Verdict::ServerFailure(format!("rcode {}", rcode.as_str()));
        }
        if msg.truncated() {
            if query.via_stream {
                return Verdict::ServerFailure("truncated over stream".into());
            }
            return Verdict::Truncated;
        }
        if !matches!(rcode, ResponseCode::NoError | ResponseCode::NxDomain) {
            return Verdict::ServerFailure(format!("rcode {}", rcode.as_str()));
        }

        let chase = match self.chase(query, &msg.answers) {
            Ok(chase) => chase,
            Err(reason) => return Verdict::ServerFailure(reason),
        };
        let chain: Vec<WireRecord> = chase.chain.into_iter().cloned().collect();
        let final_name = chase.final_name;

        if !chase.data.is_empty() {
            return Verdict::Answer {
                final_name,
                chain,
                data: chase.data.into_iter().cloned().collect(),
            };
        }

        let soa = msg
            .authority
            .iter()
            .find(|r| {
                r.record_type == RecordType::SOA
                    && in_bailiwick(&r.name, &query.zone_cut)
                    && final_name.is_subdomain_of(&r.name)
            })
            .cloned();

        if rcode == ResponseCode::NxDomain {
            return Verdict::NxDomain { final_name, chain, soa };
        }
        if !chain.is_empty() && soa.is_none() {
            return Verdict::CnameRestart {
                target: final_name,
                chain,
            };
        }
        if soa.is_some() {
            return Verdict::NoData { final_name, chain, soa };
        }

        let cut = msg
            .authority
            .iter()
            .filter(|r| {
                r.record_type == RecordType::NS
                    && in_bailiwick(&r.name, &query.zone_cut)
                    && final_name.is_subdomain_of(&r.name)
            })
            .map(|r| &r.name)
            .max_by_key(|owner| owner.label_count());
        if let Some(cut) = cut {
            if cut.label_count() > query.zone_cut.label_count() {
                return Verdict::Referral { cut: cut.clone() };
            }
            return Verdict::Lame {
                cut: query.zone_cut.clone(),
            };
        }

        Verdict::NoData {
            final_name,
            chain,
            soa: None,
        }
    }

    /// Follows CNAMEs from the question through the answer section.
    fn chase<'a>(&self, query: &Query, answers: &'a [WireRecord]) -> Result<Chase<'a>, String> {
        let qtype = query.question.record_type;
        let qclass = query.question.record_class;
        let usable: Vec<&WireRecord> = answers
            .iter()
            .filter(|r| qclass.matches(r.class) && in_bailiwick(&r.name, &query.zone_cut))
            .collect();

        let mut name = query.question.name.clone();
        let mut chain: Vec<&WireRecord> = Vec::new();
        loop {
            let data: Vec<&WireRecord> = usable
                .iter()
                .copied()
                .filter(|r| r.name == name && answers_type(qtype, r))
                .collect();
            if !data.is_empty() || qtype == RecordType::CNAME {
                return Ok(Chase {
                    final_name: name,
                    chain,
                    data,
                });
            }
            let Some(cname) = usable
                .iter()
                .copied()
                .find(|r| r.name == name && r.record_type == RecordType::CNAME)
            else {
                return Ok(Chase {
                    final_name: name,
                    chain,
                    data,
                });
            };
            let Some(target) = cname.target_name() else {
                return Err(format!("unreadable CNAME at {}", name));
            };
            if target == query.question.name || chain.iter().any(|r| r.name == target) {
                return Err(format!("CNAME loop at {}", target));
            }
            chain.push(cname);
            name = target;
        }
    }

    /// Groups the cacheable records of `msg` into RRsets. The answer
    /// section contributes only records on the CNAME chain; authority
    /// contributes NS sets and their signatures; additional contributes
    /// addresses.
    pub fn rrsets(&self, query: &Query, msg: &ParsedMessage, now_secs: u64) -> Vec<RrsetGroup> {
        let answer_cred = Credibility::for_answer(msg.authoritative());
        let mut relevant = vec![query.question.name.clone()];
        if let Ok(chase) = self.chase(query, &msg.answers) {
            relevant.extend(chase.chain.iter().filter_map(|r| r.target_name()));
        }

        let answers = msg
            .answers
            .iter()
            .filter(|r| relevant.contains(&r.name))
            .map(|r| (r, answer_cred));
        let authority = msg
            .authority
            .iter()
            .filter(|r| {
                r.record_type == RecordType::NS
                    || (r.record_type.is_signature() && covered_type(&r.rdata) == Some(RecordType::NS))
            })
            .map(|r| (r, Credibility::Additional));
        let additional = msg
            .additional
            .iter()
            .filter(|r| r.record_type.is_address())
            .map(|r| (r, Credibility::Additional));

        let mut groups: Vec<((DomainName, RecordClass, RecordType, Credibility), Vec<&WireRecord>)> = Vec::new();
        for (record, cred) in answers.chain(authority).chain(additional) {
            if !cacheable(record) || !in_bailiwick(&record.name, &query.zone_cut) {
                continue;
            }
            let key = (record.name.clone(), record.class, record.record_type, cred);
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => {
                    if !members.iter().any(|m| m.same_data(record)) {
                        members.push(record);
                    }
                }
                None => groups.push((key, vec![record])),
            }
        }

        groups
            .into_iter()
            .map(|((owner, class, rtype, cred), members)| {
                let ttl = members.iter().map(|r| r.ttl).min().unwrap_or(0);
                RrsetGroup {
                    owner,
                    records: members
                        .into_iter()
                        .map(|r| StoredRecord::cached(class, rtype, ttl, r.rdata.clone(), cred, now_secs))
                        .collect(),
                }
            })
            .collect()
    }
}

fn answers_type(qtype: RecordType, record: &WireRecord) -> bool {
    if qtype.matches(record.record_type) {
        return true;
    }
    record.record_type.is_signature()
        && covered_type(&record.rdata).is_some_and(|covered| qtype.matches(covered))
}

fn in_bailiwick(owner: &DomainName, zone_cut: &DomainName) -> bool {
    owner.is_subdomain_of(zone_cut)
}

fn cacheable(record: &WireRecord) -> bool {
    !record.record_type.is_query_only()
        && !matches!(record.record_type, RecordType::OPT | RecordType::TSIG)
        && !matches!(record.class, RecordClass::ANY | RecordClass::NONE)
}
