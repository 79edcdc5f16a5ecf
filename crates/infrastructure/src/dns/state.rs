//! The resolver context: every shared structure plus the handlers the
//! driver calls. Each handler runs to completion; only `FatalInvariant`
//! escapes as an error.

use crate::dns::answer::{signatures_last, AnswerBuilder, AnswerOutcome};
use crate::dns::cache::{NameStore, NegativeCache, NegativeKind, RecordId, StoredRecord, Table, ZoneId, ZoneKind};
use crate::dns::cache_updater::{CacheUpdater, UpdateFlags};
use crate::dns::forwarding::{
    CandidateSet, ClientKey, ClientRequest, Forwarder, Query, QueryId, QueryPurpose, QueryState, QueryTracker,
    ServerStats, TimerKey,
};
use crate::dns::resolver::{ResponseValidator, RootHints, Verdict};
use crate::dns::wire::{
    parse_header, MessageBuilder, ParsedMessage, RecordTypeMapper, ResponseHead, ResponseSections, WireRecord,
};
use hickory_proto::op::MessageType;
use hickory_proto::rr::RData;
use lodestone_dns_application::ports::{
    AccessControl, Clock, RecordVisitor, Scheduler, SignatureVerifier, Transport,
};
use lodestone_dns_domain::{
    Config, Credibility, DnsQuery, DomainError, DomainName, Opcode, RecordClass, RecordType, ResponseCode,
};
use rustc_hash::FxHasher;
use std::hash::Hasher;
use std::net::SocketAddr;
use tracing::{debug, info, warn};

/// Collaborators the core talks to.
pub struct Ports {
    pub transport: Box<dyn Transport>,
    pub scheduler: Box<dyn Scheduler>,
    pub clock: Box<dyn Clock>,
    pub access: Box<dyn AccessControl>,
    pub verifier: Box<dyn SignatureVerifier>,
}

pub struct ServerState {
    config: Config,
    store: NameStore,
    updater: CacheUpdater,
    negative: NegativeCache,
    tracker: QueryTracker,
    stats: ServerStats,
    forwarder: Forwarder,
    validator: ResponseValidator,
    answers: AnswerBuilder,
    hints: RootHints,
    ports: Ports,
    primed: bool,
}

impl ServerState {
    pub fn new(config: Config, ports: Ports) -> Result<Self, DomainError> {
        let topology = config
            .resolver
            .topology_networks()
            .map_err(|e| DomainError::ConfigError(e.to_string()))?;
        let server_keys = config
            .resolver
            .server_key_addrs()
            .map_err(|e| DomainError::ConfigError(e.to_string()))?;
        let hints = RootHints::from_config(&config.resolver)?;

        let mut state = Self {
            store: NameStore::new(),
            updater: CacheUpdater::new(&config.cache),
            negative: NegativeCache::new(&config.cache),
            tracker: QueryTracker::new(),
            stats: ServerStats::new(topology),
            forwarder: Forwarder::new(&config.resolver)?,
            validator: ResponseValidator::new(server_keys),
            answers: AnswerBuilder::new(&config.answer, config.resolver.max_cname_chain),
            hints,
            ports,
            primed: false,
            config,
        };
        let now = state.ports.clock.now_secs();
        state.hints.load(&mut state.store, &state.updater, now)?;
        info!(
            recursion = state.config.resolver.recursion,
            forwarders = state.forwarder.has_forwarders(),
            forward_only = state.forwarder.forward_only(),
            root_hints = state.hints.len(),
            "Resolver state ready"
        );
        Ok(state)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &NameStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut NameStore {
        &mut self.store
    }

    pub fn updater(&self) -> &CacheUpdater {
        &self.updater
    }

    pub fn tracker(&self) -> &QueryTracker {
        &self.tracker
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    fn now_ms(&self) -> u64 {
        self.ports.clock.now_ms()
    }

    fn now_secs(&self) -> u64 {
        self.ports.clock.now_secs()
    }

    // ---- client side ----

    pub fn handle_client_datagram(&mut self, from: SocketAddr, bytes: &[u8]) -> Result<(), DomainError> {
        let msg = match ParsedMessage::parse(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(client = %from, error = %e, "Malformed client message");
                if let Ok(header) = parse_header(bytes) {
                    if header.message_type() == MessageType::Query {
                        self.send_error(from, ResponseHead::answering(&header, ResponseCode::FormErr), None);
                    }
                }
                return Ok(());
            }
        };
        if msg.is_response() {
            debug!(client = %from, "Response on client socket, dropping");
            return Ok(());
        }

        let recursion_available = self.config.resolver.recursion && self.ports.access.allow_recursion(from);
        let error_head =
            |rcode: ResponseCode| ResponseHead::answering(&msg.header, rcode).with_recursion_available(recursion_available);
        if msg.opcode() != Opcode::Query {
            self.send_error(from, error_head(ResponseCode::NotImp), msg.question());
            return Ok(());
        }
        if msg.questions.len() != 1 {
            self.send_error(from, error_head(ResponseCode::FormErr), None);
            return Ok(());
        }
        let question = msg.questions[0].clone();
        if matches!(question.record_type, RecordType::AXFR | RecordType::IXFR) {
            self.send_error(from, error_head(ResponseCode::NotImp), Some(&question));
            return Ok(());
        }

        let request = ClientRequest {
            key: ClientKey {
                addr: from,
                id: msg.id(),
                payload_hash: payload_hash(bytes),
            },
            recursion_desired: msg.recursion_desired(),
            edns_size: msg.edns.map(|e| e.udp_size),
        };
        if self.tracker.is_duplicate(&request.key) {
            debug!(client = %from, id = msg.id(), "Duplicate of an in-flight request, dropping");
            return Ok(());
        }

        let recursion = recursion_available && request.recursion_desired;
        let now = self.now_secs();
        let answer = match self.answers.answer(&mut self.store, &question, recursion, now) {
            Ok(answer) => answer,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(client = %from, question = %question, error = %e, "Local answer failed");
                self.reply_error(&request, &question, ResponseCode::ServFail, recursion_available);
                return Ok(());
            }
        };
        debug!(client = %from, question = %question, outcome = answer.outcome.as_str(), "Client question");

        match answer.outcome {
            AnswerOutcome::ForwardRequired { question: next, chain } => {
                self.start_client_query(request, question, next, chain)
            }
            _ => {
                self.reply(
                    &request,
                    &question,
                    answer.rcode,
                    answer.authoritative,
                    recursion_available,
                    &answer.sections,
                );
                Ok(())
            }
        }
    }

    fn start_client_query(
        &mut self,
        request: ClientRequest,
        original: DnsQuery,
        next: DnsQuery,
        chain: Vec<WireRecord>,
    ) -> Result<(), DomainError> {
        let mut query = Query::new(
            QueryPurpose::Client(request),
            original,
            self.now_ms(),
            self.forwarder.query_lifetime_ms(),
        );
        query.question = next;
        query.chain = chain;
        let id = self.tracker.insert(query);
        self.begin(id)
    }

    /// Starts a system query for `question`. Client questions go through
    /// `handle_client_datagram` instead.
    pub fn resolve(&mut self, question: DnsQuery, purpose: QueryPurpose) -> Result<QueryId, DomainError> {
        let query = Query::new(purpose, question, self.now_ms(), self.forwarder.query_lifetime_ms());
        let id = self.tracker.insert(query);
        self.begin(id)?;
        Ok(id)
    }

    /// Sends the startup `. NS` query. Skipped when only forwarders are used.
    pub fn start_priming(&mut self) -> Result<(), DomainError> {
        if self.forwarder.forward_only() || self.hints.is_empty() {
            return Ok(());
        }
        info!(hints = self.hints.len(), "Priming root servers");
        self.resolve(DnsQuery::new(DomainName::root(), RecordType::NS), QueryPurpose::Priming)?;
        Ok(())
    }

    // ---- upstream side ----

    pub fn handle_upstream_datagram(&mut self, from: SocketAddr, bytes: &[u8]) -> Result<(), DomainError> {
        let msg = match ParsedMessage::parse(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                let Ok(header) = parse_header(bytes) else {
                    debug!(server = %from, "Unreadable upstream datagram");
                    return Ok(());
                };
                if let Some((id, index)) = self.validator.match_header(&self.tracker, from, &header) {
                    warn!(server = %from, query = %id, error = %e, "Malformed upstream response");
                    return self.server_failed(id, index);
                }
                return Ok(());
            }
        };
        let Some((id, index)) = self.validator.match_query(&self.tracker, from, &msg) else {
            return Ok(());
        };
        if !self
            .validator
            .check_signature(from, &msg, self.ports.verifier.as_ref())
        {
            return self.server_failed(id, index);
        }

        let now_ms = self.now_ms();
        let Some(query) = self.tracker.get(id) else {
            return Ok(());
        };
        let verdict = self.validator.classify(query, &msg);
        let forwarding = query.forwarding;
        let usable = match &verdict {
            Verdict::Answer { .. } | Verdict::CnameRestart { .. } | Verdict::NxDomain { .. } | Verdict::NoData { .. } => true,
            Verdict::Referral { .. } => !forwarding,
            Verdict::ServerFailure(_) | Verdict::Truncated | Verdict::Lame { .. } => false,
        };
        if usable {
            self.forwarder.note_answer(query, index, &mut self.stats, now_ms);
        }
        debug!(query = %id, server = %from, verdict = verdict.as_str(), "Upstream response");

        match verdict {
            Verdict::ServerFailure(reason) => {
                debug!(query = %id, server = %from, reason = %reason, "Server failed");
                self.server_failed(id, index)
            }
            Verdict::Truncated => self.resend_stream(id, index),
            Verdict::Referral { .. } if forwarding => {
                warn!(server = %from, "Forwarder answered with a referral");
                self.server_failed(id, index)
            }
            Verdict::Referral { cut } => self.follow_referral(id, index, &msg, cut),
            Verdict::Lame { cut } => {
                self.stats.mark_lame(from.ip(), &cut);
                self.server_failed(id, index)
            }
            Verdict::Answer { chain, data, .. } => {
                self.cache_response(id, &msg)?;
                self.answered(id, chain, data, &msg)
            }
            Verdict::CnameRestart { target, chain } => {
                self.cache_response(id, &msg)?;
                self.restart(id, target, chain)
            }
            Verdict::NxDomain {
                final_name,
                chain,
                soa,
            } => {
                self.cache_response(id, &msg)?;
                self.negative_answer(id, NegativeKind::NxDomain, final_name, chain, soa, &msg)
            }
            Verdict::NoData {
                final_name,
                chain,
                soa,
            } => {
                self.cache_response(id, &msg)?;
                self.negative_answer(id, NegativeKind::NoData, final_name, chain, soa, &msg)
            }
        }
    }

    /// Commits the cacheable RRsets of a response. Rejections by more
    /// credible data are expected and only logged.
    fn cache_response(&mut self, id: QueryId, msg: &ParsedMessage) -> Result<(), DomainError> {
        let now = self.now_secs();
        let Some(query) = self.tracker.get(id) else {
            return Ok(());
        };
        let groups = self.validator.rrsets(query, msg, now);
        for group in groups {
            let rtype = group.records.first().map(|r| r.record_type);
            match self
                .updater
                .commit_rrset(&mut self.store, Table::Main, &group.owner, group.records, now)
            {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!(owner = %group.owner, record_type = ?rtype, error = %e, "RRset not cached"),
            }
        }
        Ok(())
    }

    fn answered(
        &mut self,
        id: QueryId,
        chain: Vec<WireRecord>,
        mut data: Vec<WireRecord>,
        msg: &ParsedMessage,
    ) -> Result<(), DomainError> {
        if let Some(query) = self.tracker.get_mut(id) {
            query.chain.extend(chain);
        }
        if self.over_limits(id) {
            return self.fail_query(id, "CNAME chain too long");
        }
        let Some(query) = self.finish(id)? else {
            return Ok(());
        };
        match &query.purpose {
            QueryPurpose::Client(request) => {
                signatures_last(&mut data, |r| r.record_type);
                let mut sections = ResponseSections {
                    answers: query.chain.clone(),
                    ..ResponseSections::default()
                };
                sections.answers.extend(data);
                self.reply(request, &query.original, ResponseCode::NoError, false, true, &sections);
            }
            QueryPurpose::Priming => self.priming_answered(msg),
            QueryPurpose::AddressLookup { parent } => self.lookup_finished(*parent)?,
        }
        Ok(())
    }

    fn negative_answer(
        &mut self,
        id: QueryId,
        kind: NegativeKind,
        final_name: DomainName,
        chain: Vec<WireRecord>,
        soa: Option<WireRecord>,
        msg: &ParsedMessage,
    ) -> Result<(), DomainError> {
        let now = self.now_secs();
        let Some(query) = self.tracker.get_mut(id) else {
            return Ok(());
        };
        query.chain.extend(chain);
        let question = DnsQuery::with_class(final_name.clone(), query.question.record_type, query.question.record_class);
        if self.over_limits(id) {
            return self.fail_query(id, "CNAME chain too long");
        }

        let mut authority = Vec::new();
        if let Some(soa) = soa {
            let credibility = Credibility::for_answer(msg.authoritative());
            let entry = self.negative.build_entry(kind, &question, &soa, credibility, now)?;
            let entry = self.updater.prepare(entry, now);
            let ttl = entry.ttl;
            match self
                .updater
                .commit_rrset(&mut self.store, Table::Main, &final_name, vec![entry], now)
            {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!(name = %final_name, error = %e, "Negative entry not cached"),
            }
            authority.push(WireRecord { ttl, ..soa });
        }

        let Some(query) = self.finish(id)? else {
            return Ok(());
        };
        match &query.purpose {
            QueryPurpose::Client(request) => {
                let rcode = match kind {
                    NegativeKind::NxDomain => ResponseCode::NxDomain,
                    NegativeKind::NoData => ResponseCode::NoError,
                };
                let sections = ResponseSections {
                    answers: query.chain.clone(),
                    authority,
                    additional: Vec::new(),
                };
                self.reply(request, &query.original, rcode, false, true, &sections);
            }
            QueryPurpose::Priming => {
                warn!(kind = kind.as_str(), "Negative answer to priming query");
                self.schedule_priming_retry();
            }
            QueryPurpose::AddressLookup { parent } => self.lookup_finished(*parent)?,
        }
        Ok(())
    }

    fn priming_answered(&mut self, msg: &ParsedMessage) {
        let now = self.now_secs();
        let confirmed = self.hints.confirmed(&self.store, msg, now);
        if self.hints.accept(confirmed) {
            self.primed = true;
        } else {
            self.schedule_priming_retry();
        }
    }

    fn schedule_priming_retry(&mut self) {
        let at = self.now_ms() + self.config.resolver.priming_retry_secs * 1000;
        debug!(retry_at_ms = at, "Priming retry scheduled");
        self.tracker.schedule_priming(at, self.ports.scheduler.as_ref());
    }

    fn follow_referral(
        &mut self,
        id: QueryId,
        index: usize,
        msg: &ParsedMessage,
        cut: DomainName,
    ) -> Result<(), DomainError> {
        if let Some(query) = self.tracker.get_mut(id) {
            query.subqueries += 1;
        }
        if self.over_limits(id) {
            return self.fail_query(id, "too many referrals");
        }
        self.cache_response(id, msg)?;

        let now = self.now_secs();
        let Some(query) = self.tracker.get(id) else {
            return Ok(());
        };
        let previous_cut = query.zone_cut.label_count();
        let set = self.forwarder.iterative_candidates(
            &self.store,
            &self.stats,
            &query.question.name,
            query.question.record_class,
            now,
        )?;
        if set.zone_cut.label_count() <= previous_cut {
            debug!(query = %id, cut = %cut, "Referral did not take us closer");
            return self.server_failed(id, index);
        }
        debug!(query = %id, cut = %set.zone_cut, servers = set.candidates.len(), "Following referral");
        self.install(id, set, false)?;
        self.dispatch(id)
    }

    fn restart(&mut self, id: QueryId, target: DomainName, chain: Vec<WireRecord>) -> Result<(), DomainError> {
        let Some(query) = self.tracker.get_mut(id) else {
            return Ok(());
        };
        query.chain.extend(chain);
        query.subqueries += 1;
        query.question = query.question.retarget(target);
        if self.over_limits(id) {
            return self.fail_query(id, "CNAME chain too long");
        }

        // The rest of the chain may already be held locally.
        let now = self.now_secs();
        let Some(query) = self.tracker.get(id) else {
            return Ok(());
        };
        let question = query.question.clone();
        let answer = match self.answers.answer(&mut self.store, &question, true, now) {
            Ok(answer) => answer,
            Err(e) if e.is_fatal() => return Err(e),
            Err(_) => return self.fail_query(id, "local data unusable"),
        };
        debug!(query = %id, target = %question.name, outcome = answer.outcome.as_str(), "CNAME restart");
        match answer.outcome {
            AnswerOutcome::ForwardRequired { question: next, chain } => {
                if let Some(query) = self.tracker.get_mut(id) {
                    query.chain.extend(chain);
                    query.question = next;
                }
                if self.over_limits(id) {
                    return self.fail_query(id, "CNAME chain too long");
                }
                self.begin(id)
            }
            AnswerOutcome::ServerFailure | AnswerOutcome::Referral => self.fail_query(id, "CNAME chain too long"),
            _ => {
                let Some(query) = self.finish(id)? else {
                    return Ok(());
                };
                match &query.purpose {
                    QueryPurpose::Client(request) => {
                        let mut sections = answer.sections;
                        let mut answers = query.chain.clone();
                        answers.append(&mut sections.answers);
                        sections.answers = answers;
                        self.reply(request, &query.original, answer.rcode, false, true, &sections);
                    }
                    QueryPurpose::Priming => self.schedule_priming_retry(),
                    QueryPurpose::AddressLookup { parent } => self.lookup_finished(*parent)?,
                }
                Ok(())
            }
        }
    }

    fn over_limits(&self, id: QueryId) -> bool {
        match self.tracker.get(id) {
            Some(query) => match self.forwarder.check_limits(query) {
                Ok(()) => false,
                Err(e) => {
                    debug!(query = %id, error = %e, "Query over its limits");
                    true
                }
            },
            None => false,
        }
    }

    // ---- candidates and sending ----

    /// Picks the first server set for the current question and sends.
    fn begin(&mut self, id: QueryId) -> Result<(), DomainError> {
        let Some(query) = self.tracker.get(id) else {
            return Ok(());
        };
        let set = if matches!(query.purpose, QueryPurpose::Priming) {
            // Priming only ever asks the root hints.
            let set = self.forwarder.hint_candidates(
                &self.store,
                &self.stats,
                query.question.record_class,
                self.now_secs(),
            )?;
            Some((set, false))
        } else if self.forwarder.has_forwarders() {
            Some((self.forwarder.forwarder_candidates(), true))
        } else {
            self.iterative_set(id)?.map(|set| (set, false))
        };
        let Some((set, forwarding)) = set else {
            return Ok(());
        };
        self.install(id, set, forwarding)?;
        self.dispatch(id)
    }

    fn iterative_set(&self, id: QueryId) -> Result<Option<CandidateSet>, DomainError> {
        let Some(query) = self.tracker.get(id) else {
            return Ok(None);
        };
        let set = self.forwarder.iterative_candidates(
            &self.store,
            &self.stats,
            &query.question.name,
            query.question.record_class,
            self.now_secs(),
        )?;
        Ok(Some(set))
    }

    /// Makes `set` the query's candidates, moving record holds over and
    /// drawing a fresh upstream id.
    fn install(&mut self, id: QueryId, set: CandidateSet, forwarding: bool) -> Result<(), DomainError> {
        for &record in &set.held {
            self.store.retain(record)?;
        }
        let Some(query) = self.tracker.get_mut(id) else {
            release_all(&mut self.store, set.held)?;
            return Ok(());
        };
        let old = std::mem::replace(&mut query.held, set.held);
        query.candidates = set.candidates;
        query.missing = set.missing;
        query.zone_cut = set.zone_cut;
        query.current = None;
        query.forwarding = forwarding;
        query.via_stream = false;
        query.state = QueryState::Created;
        release_all(&mut self.store, old)?;
        self.tracker.assign_upstream_id(id);
        Ok(())
    }

    /// Sends to the next usable candidate, or works out what to do when
    /// none is left.
    fn dispatch(&mut self, id: QueryId) -> Result<(), DomainError> {
        let now = self.now_ms();
        let Some(query) = self.tracker.get_mut(id) else {
            return Ok(());
        };
        if now >= query.expires_at_ms {
            return self.fail_query(id, "query expired");
        }
        match self
            .forwarder
            .send(query, self.ports.transport.as_ref(), &mut self.stats, now)
        {
            Ok(deadline) => {
                self.tracker.schedule(id, deadline, self.ports.scheduler.as_ref());
                Ok(())
            }
            Err(DomainError::ServerUnreachable) => self.exhausted(id),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(query = %id, error = %e, "Could not build upstream query");
                self.fail_query(id, "query not sendable")
            }
        }
    }

    fn exhausted(&mut self, id: QueryId) -> Result<(), DomainError> {
        let Some(query) = self.tracker.get(id) else {
            return Ok(());
        };
        if query.forwarding && !self.forwarder.forward_only() {
            debug!(query = %id, "Forwarders exhausted, iterating");
            if let Some(set) = self.iterative_set(id)? {
                self.install(id, set, false)?;
                return self.dispatch(id);
            }
        }
        let Some(query) = self.tracker.get(id) else {
            return Ok(());
        };
        let may_look_up = !query.missing.is_empty() && !matches!(query.purpose, QueryPurpose::AddressLookup { .. });
        if may_look_up {
            return self.start_address_lookups(id);
        }
        self.fail_query(id, "no server left")
    }

    /// Resolves addresses of the NS names at the cut, parking the query
    /// until they are in.
    fn start_address_lookups(&mut self, id: QueryId) -> Result<(), DomainError> {
        let now = self.now_ms();
        let lifetime = self.forwarder.query_lifetime_ms();
        let Some(query) = self.tracker.get_mut(id) else {
            return Ok(());
        };
        let names = std::mem::take(&mut query.missing);
        let class = query.question.record_class;
        let expires_at = query.expires_at_ms;
        query.subqueries += names.len();
        if self.over_limits(id) {
            return self.fail_query(id, "too many address lookups");
        }

        let children: Vec<QueryId> = names
            .into_iter()
            .map(|name| {
                debug!(query = %id, server = %name, "Looking up name server address");
                let lookup = Query::new(
                    QueryPurpose::AddressLookup { parent: id },
                    DnsQuery::with_class(name, RecordType::A, class),
                    now,
                    lifetime,
                );
                self.tracker.insert(lookup)
            })
            .collect();
        if let Some(query) = self.tracker.get_mut(id) {
            query.state = QueryState::AwaitingAddresses {
                pending: children.len(),
            };
        }
        self.tracker.schedule(id, expires_at, self.ports.scheduler.as_ref());
        for child in children {
            self.begin(child)?;
        }
        Ok(())
    }

    /// One address lookup of `parent` is done, one way or another.
    fn lookup_finished(&mut self, parent: QueryId) -> Result<(), DomainError> {
        let Some(query) = self.tracker.get_mut(parent) else {
            return Ok(());
        };
        let QueryState::AwaitingAddresses { pending } = query.state else {
            return Ok(());
        };
        if pending > 1 {
            query.state = QueryState::AwaitingAddresses { pending: pending - 1 };
            return Ok(());
        }
        query.state = QueryState::Created;

        // Keep what we learned about servers already tried.
        let Some(set) = self.iterative_set(parent)? else {
            return Ok(());
        };
        let Some(query) = self.tracker.get(parent) else {
            return Ok(());
        };
        if set.zone_cut != query.zone_cut {
            self.install(parent, set, false)?;
        } else {
            let fresh: Vec<_> = set
                .candidates
                .into_iter()
                .filter(|c| query.candidates.iter().all(|known| known.addr != c.addr))
                .collect();
            if let Some(query) = self.tracker.get_mut(parent) {
                query.candidates.extend(fresh);
            }
        }
        if let Some(query) = self.tracker.get_mut(parent) {
            query.missing.clear();
        }
        debug!(query = %parent, "Address lookups done, resuming");
        self.dispatch(parent)
    }

    fn server_failed(&mut self, id: QueryId, index: usize) -> Result<(), DomainError> {
        let Some(query) = self.tracker.get_mut(id) else {
            return Ok(());
        };
        if let Some(candidate) = query.candidates.get_mut(index) {
            candidate.bad = true;
            debug!(query = %id, server = %candidate.addr, "Server marked bad for this query");
        }
        self.dispatch(id)
    }

    fn resend_stream(&mut self, id: QueryId, index: usize) -> Result<(), DomainError> {
        let now = self.now_ms();
        let Some(query) = self.tracker.get_mut(id) else {
            return Ok(());
        };
        query.current = Some(index);
        match self
            .forwarder
            .resend_stream(query, self.ports.transport.as_ref(), &mut self.stats, now)
        {
            Ok(deadline) => {
                self.tracker.schedule(id, deadline, self.ports.scheduler.as_ref());
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(query = %id, error = %e, "Stream retry failed");
                self.server_failed(id, index)
            }
        }
    }

    // ---- completion ----

    /// Drops a finished query and its record holds.
    fn finish(&mut self, id: QueryId) -> Result<Option<Query>, DomainError> {
        let Some(mut query) = self.tracker.remove(id, self.ports.scheduler.as_ref()) else {
            return Ok(None);
        };
        release_all(&mut self.store, std::mem::take(&mut query.held))?;
        Ok(Some(query))
    }

    fn fail_query(&mut self, id: QueryId, reason: &str) -> Result<(), DomainError> {
        let Some(query) = self.finish(id)? else {
            return Ok(());
        };
        debug!(query = %id, question = %query.question, reason, "Query failed");
        match &query.purpose {
            QueryPurpose::Client(request) => {
                self.reply_error(request, &query.original, ResponseCode::ServFail, true);
            }
            QueryPurpose::Priming => self.schedule_priming_retry(),
            QueryPurpose::AddressLookup { parent } => self.lookup_finished(*parent)?,
        }
        Ok(())
    }

    // ---- timers and maintenance ----

    /// Runs everything whose deadline has passed, then re-arms the timer.
    pub fn handle_timer(&mut self) -> Result<(), DomainError> {
        let now = self.now_ms();
        for key in self.tracker.take_due(now) {
            match key {
                TimerKey::Priming => self.start_priming()?,
                TimerKey::Query(id) => {
                    let Some(query) = self.tracker.get(id) else {
                        continue;
                    };
                    if now >= query.expires_at_ms || matches!(query.state, QueryState::AwaitingAddresses { .. }) {
                        self.fail_query(id, "query expired")?;
                    } else {
                        debug!(query = %id, "Retry timeout");
                        self.dispatch(id)?;
                    }
                }
            }
        }
        self.tracker.rearm(self.ports.scheduler.as_ref());
        Ok(())
    }

    /// Deletes stale cache records and the nodes they leave empty.
    pub fn purge_stale(&mut self) -> Result<usize, DomainError> {
        let now = self.now_secs();
        let removed = self.store.purge_stale(now)?;
        for zone in self.store.zones().take_maintenance_requests() {
            info!(zone = zone.0, "Zone needs maintenance");
        }
        debug!(removed, "Stale records purged");
        Ok(removed)
    }

    pub fn for_each_record(&self, visitor: &mut dyn RecordVisitor) {
        self.store.for_each_record(Table::Main, visitor, self.now_secs());
    }

    /// Registers a zone. Its records are added with `add_zone_record`.
    pub fn add_zone(&mut self, origin: DomainName, class: RecordClass, kind: ZoneKind, expire_secs: u32) -> ZoneId {
        let now = self.now_secs();
        info!(zone = %origin, kind = kind.as_str(), "Zone added");
        self.store.zones_mut().add(origin, class, kind, expire_secs, now)
    }

    pub fn add_zone_record(
        &mut self,
        zone: ZoneId,
        owner: &DomainName,
        ttl: u32,
        rdata: RData,
    ) -> Result<(), DomainError> {
        let Some(descriptor) = self.store.zones().get(zone) else {
            return Err(DomainError::ConfigError(format!("unknown zone {}", zone.0)));
        };
        if !owner.is_subdomain_of(&descriptor.origin) {
            return Err(DomainError::AuthorityViolation);
        }
        let record_type = RecordTypeMapper::from_hickory(rdata.record_type());
        let record = StoredRecord::zone_data(zone, descriptor.clevel(), descriptor.class, record_type, ttl, rdata);
        let now = self.now_secs();
        self.updater
            .update(&mut self.store, Table::Main, owner, None, Some(record), UpdateFlags::NONE, now)
    }

    // ---- replies ----

    #[allow(clippy::too_many_arguments)]
    fn reply(
        &self,
        request: &ClientRequest,
        question: &DnsQuery,
        rcode: ResponseCode,
        authoritative: bool,
        recursion_available: bool,
        sections: &ResponseSections,
    ) {
        let head = ResponseHead::query_reply(request.key.id, request.recursion_desired, rcode)
            .with_authoritative(authoritative)
            .with_recursion_available(recursion_available);
        let limit = self.answers.response_limit(request.edns_size);
        let echo = request.edns_size.map(|_| self.config.answer.max_udp_size);
        match MessageBuilder::build_response(head, Some(question), sections, limit, echo) {
            Ok(bytes) => self.send_client(request.key.addr, &bytes),
            Err(e) => {
                warn!(client = %request.key.addr, error = %e, "Could not encode response");
                self.reply_error(request, question, ResponseCode::ServFail, recursion_available);
            }
        }
    }

    fn reply_error(&self, request: &ClientRequest, question: &DnsQuery, rcode: ResponseCode, recursion_available: bool) {
        let head = ResponseHead::query_reply(request.key.id, request.recursion_desired, rcode)
            .with_recursion_available(recursion_available);
        self.send_error(request.key.addr, head, Some(question));
    }

    fn send_error(&self, client: SocketAddr, head: ResponseHead, question: Option<&DnsQuery>) {
        match MessageBuilder::build_error(head, question) {
            Ok(bytes) => self.send_client(client, &bytes),
            Err(e) => warn!(client = %client, error = %e, "Could not encode error reply"),
        }
    }

    fn send_client(&self, client: SocketAddr, bytes: &[u8]) {
        if let Err(e) = self.ports.transport.send_to_client(client, bytes) {
            warn!(client = %client, error = %e, "Reply not sent");
        }
    }
}

fn release_all(store: &mut NameStore, held: Vec<RecordId>) -> Result<(), DomainError> {
    for id in held {
        store.release(id)?;
    }
    Ok(())
}

fn payload_hash(bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(bytes);
    hasher.finish()
}
