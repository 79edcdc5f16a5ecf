use crate::dns::cache::RecordId;
use crate::dns::wire::WireRecord;
use lodestone_dns_application::ports::Scheduler;
use lodestone_dns_domain::{DnsQuery, DomainName};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(pub u64);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// Identity of a client request, used to drop retransmissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub addr: SocketAddr,
    pub id: u16,
    pub payload_hash: u64,
}

#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub key: ClientKey,
    pub recursion_desired: bool,
    /// UDP payload size the client advertised, if it sent OPT.
    pub edns_size: Option<u16>,
}

#[derive(Debug, Clone)]
pub enum QueryPurpose {
    /// Resolution on behalf of a client.
    Client(ClientRequest),
    /// The startup `. NS` query.
    Priming,
    /// Address of a name server another query is waiting on.
    AddressLookup { parent: QueryId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Created,
    Sent,
    AwaitingAddresses { pending: usize },
}

/// A server a query may be sent to.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub addr: SocketAddr,
    /// NS name the address was found under; `None` for forwarders and hints
    /// given by address only.
    pub name: Option<DomainName>,
    pub sends: u8,
    pub bad: bool,
    pub sent_at_ms: Option<u64>,
}

impl Candidate {
    pub fn new(addr: SocketAddr, name: Option<DomainName>) -> Self {
        Self {
            addr,
            name,
            sends: 0,
            bad: false,
            sent_at_ms: None,
        }
    }
}

/// One in-flight resolution.
#[derive(Debug)]
pub struct Query {
    pub id: QueryId,
    pub purpose: QueryPurpose,
    /// The question as the client asked it.
    pub original: DnsQuery,
    /// The question currently being asked upstream; differs from `original`
    /// after a CNAME restart.
    pub question: DnsQuery,
    pub upstream_id: u16,
    /// Closest enclosing zone the current candidates serve.
    pub zone_cut: DomainName,
    pub candidates: Vec<Candidate>,
    /// NS names at the cut still waiting for an address lookup.
    pub missing: Vec<DomainName>,
    /// Index of the candidate last sent to.
    pub current: Option<usize>,
    /// Candidates come from configured forwarders.
    pub forwarding: bool,
    /// Resend over the stream transport after a truncated reply.
    pub via_stream: bool,
    pub expires_at_ms: u64,
    pub retry_at_ms: Option<u64>,
    /// CNAME records collected while chasing the chain.
    pub chain: Vec<WireRecord>,
    /// Referrals followed plus CNAME restarts.
    pub subqueries: usize,
    /// Store records this query keeps alive.
    pub held: Vec<RecordId>,
    pub state: QueryState,
}

impl Query {
    pub fn new(purpose: QueryPurpose, question: DnsQuery, now_ms: u64, lifetime_ms: u64) -> Self {
        Self {
            id: QueryId(0),
            purpose,
            original: question.clone(),
            question,
            upstream_id: 0,
            zone_cut: DomainName::root(),
            candidates: Vec::new(),
            missing: Vec::new(),
            current: None,
            forwarding: false,
            via_stream: false,
            expires_at_ms: now_ms + lifetime_ms,
            retry_at_ms: None,
            chain: Vec::new(),
            subqueries: 0,
            held: Vec::new(),
            state: QueryState::Created,
        }
    }

    pub fn client(&self) -> Option<&ClientRequest> {
        match &self.purpose {
            QueryPurpose::Client(request) => Some(request),
            _ => None,
        }
    }

    pub fn current_candidate(&self) -> Option<&Candidate> {
        self.current.and_then(|i| self.candidates.get(i))
    }

    /// Index of a candidate we sent to at `addr`.
    pub fn sent_candidate(&self, addr: SocketAddr) -> Option<usize> {
        self.candidates
            .iter()
            .position(|c| c.addr == addr && c.sends > 0)
    }
}

/// Something the single retry timer may fire for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimerKey {
    Query(QueryId),
    Priming,
}

/// Every outstanding query, indexed by upstream transaction id and client
/// identity, plus the deadline queue behind the one physical timer.
#[derive(Default)]
pub struct QueryTracker {
    queries: FxHashMap<QueryId, Query>,
    by_upstream: FxHashMap<u16, QueryId>,
    by_client: FxHashMap<ClientKey, QueryId>,
    deadlines: BTreeSet<(u64, TimerKey)>,
    priming_at_ms: Option<u64>,
    armed_ms: Option<u64>,
    next_id: u64,
}

impl QueryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn insert(&mut self, mut query: Query) -> QueryId {
        self.next_id += 1;
        let id = QueryId(self.next_id);
        query.id = id;
        if let Some(request) = query.client() {
            self.by_client.insert(request.key, id);
        }
        self.queries.insert(id, query);
        trace!(query = %id, "Query created");
        id
    }

    pub fn get(&self, id: QueryId) -> Option<&Query> {
        self.queries.get(&id)
    }

    pub fn get_mut(&mut self, id: QueryId) -> Option<&mut Query> {
        self.queries.get_mut(&id)
    }

    pub fn ids(&self) -> Vec<QueryId> {
        self.queries.keys().copied().collect()
    }

    pub fn is_duplicate(&self, key: &ClientKey) -> bool {
        self.by_client.contains_key(key)
    }

    pub fn find_by_upstream(&self, upstream_id: u16) -> Option<QueryId> {
        self.by_upstream.get(&upstream_id).copied()
    }

    /// Gives the query a fresh transaction id not used by any other
    /// outstanding query.
    pub fn assign_upstream_id(&mut self, id: QueryId) -> Option<u16> {
        let query = self.queries.get(&id)?;
        if self.by_upstream.get(&query.upstream_id) == Some(&id) {
            self.by_upstream.remove(&query.upstream_id);
        }
        let mut upstream_id = fastrand::u16(..);
        while self.by_upstream.contains_key(&upstream_id) {
            upstream_id = fastrand::u16(..);
        }
        self.by_upstream.insert(upstream_id, id);
        if let Some(query) = self.queries.get_mut(&id) {
            query.upstream_id = upstream_id;
        }
        Some(upstream_id)
    }

    /// Sets (or moves) the retry deadline of a query and re-arms the timer.
    pub fn schedule(&mut self, id: QueryId, deadline_ms: u64, scheduler: &dyn Scheduler) {
        let Some(query) = self.queries.get_mut(&id) else {
            return;
        };
        if let Some(old) = query.retry_at_ms.replace(deadline_ms) {
            self.deadlines.remove(&(old, TimerKey::Query(id)));
        }
        self.deadlines.insert((deadline_ms, TimerKey::Query(id)));
        self.rearm(scheduler);
    }

    pub fn unschedule(&mut self, id: QueryId, scheduler: &dyn Scheduler) {
        if let Some(old) = self.queries.get_mut(&id).and_then(|q| q.retry_at_ms.take()) {
            self.deadlines.remove(&(old, TimerKey::Query(id)));
            self.rearm(scheduler);
        }
    }

    pub fn schedule_priming(&mut self, deadline_ms: u64, scheduler: &dyn Scheduler) {
        if let Some(old) = self.priming_at_ms.replace(deadline_ms) {
            self.deadlines.remove(&(old, TimerKey::Priming));
        }
        self.deadlines.insert((deadline_ms, TimerKey::Priming));
        self.rearm(scheduler);
    }

    /// Drops the query from every index and the deadline queue.
    pub fn remove(&mut self, id: QueryId, scheduler: &dyn Scheduler) -> Option<Query> {
        let query = self.queries.remove(&id)?;
        if self.by_upstream.get(&query.upstream_id) == Some(&id) {
            self.by_upstream.remove(&query.upstream_id);
        }
        if let Some(request) = query.client() {
            if self.by_client.get(&request.key) == Some(&id) {
                self.by_client.remove(&request.key);
            }
        }
        if let Some(deadline) = query.retry_at_ms {
            self.deadlines.remove(&(deadline, TimerKey::Query(id)));
            self.rearm(scheduler);
        }
        trace!(query = %id, "Query destroyed");
        Some(query)
    }

    /// Pops every deadline at or before `now_ms`.
    pub fn take_due(&mut self, now_ms: u64) -> Vec<TimerKey> {
        let mut due = Vec::new();
        while let Some(&(deadline, key)) = self.deadlines.first() {
            if deadline > now_ms {
                break;
            }
            self.deadlines.pop_first();
            match key {
                TimerKey::Query(id) => {
                    if let Some(query) = self.queries.get_mut(&id) {
                        query.retry_at_ms = None;
                    }
                }
                TimerKey::Priming => self.priming_at_ms = None,
            }
            due.push(key);
        }
        // The fired deadline is gone; forget it so the next one is armed.
        self.armed_ms = None;
        due
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.deadlines.first().map(|(deadline, _)| *deadline)
    }

    /// Keeps the physical timer on the earliest deadline.
    pub fn rearm(&mut self, scheduler: &dyn Scheduler) {
        let next = self.next_deadline();
        if next == self.armed_ms {
            return;
        }
        match next {
            Some(deadline) => scheduler.arm(deadline),
            None => scheduler.disarm(),
        }
        self.armed_ms = next;
    }
}
