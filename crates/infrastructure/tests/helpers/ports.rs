//! In-memory stand-ins for the ports, and a harness that drives a
//! `ServerState` through them.

use super::builders::client_query;
use lodestone_dns_application::ports::{AllowAll, Clock, Scheduler, SignatureVerifier, Transport};
use lodestone_dns_domain::{Config, DomainError};
use lodestone_dns_infrastructure::dns::wire::ParsedMessage;
use lodestone_dns_infrastructure::dns::{Ports, ServerState};
use std::cell::{Cell, RefCell};
use std::net::SocketAddr;
use std::rc::Rc;

pub type Sent = Rc<RefCell<Vec<(SocketAddr, Vec<u8>)>>>;

pub const START_MS: u64 = 1_700_000_000_000;

pub fn client_addr() -> SocketAddr {
    "192.0.2.10:40000".parse().unwrap()
}

#[derive(Clone, Default)]
pub struct FakeTransport {
    pub to_client: Sent,
    pub datagrams: Sent,
    pub streams: Sent,
}

impl Transport for FakeTransport {
    fn send_to_client(&self, client: SocketAddr, bytes: &[u8]) -> Result<(), DomainError> {
        self.to_client.borrow_mut().push((client, bytes.to_vec()));
        Ok(())
    }

    fn send_datagram(&self, server: SocketAddr, bytes: &[u8]) -> Result<(), DomainError> {
        self.datagrams.borrow_mut().push((server, bytes.to_vec()));
        Ok(())
    }

    fn send_stream(&self, server: SocketAddr, bytes: &[u8]) -> Result<(), DomainError> {
        self.streams.borrow_mut().push((server, bytes.to_vec()));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakeScheduler {
    pub armed: Rc<Cell<Option<u64>>>,
}

impl Scheduler for FakeScheduler {
    fn arm(&self, deadline_ms: u64) {
        self.armed.set(Some(deadline_ms));
    }

    fn disarm(&self) {
        self.armed.set(None);
    }
}

#[derive(Clone)]
pub struct FakeClock {
    pub now: Rc<Cell<u64>>,
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

/// Accepts exactly one signature value.
pub struct FakeVerifier {
    pub valid_mac: Vec<u8>,
}

impl SignatureVerifier for FakeVerifier {
    fn verify(&self, _key: &str, _message: &[u8], signature: &[u8]) -> bool {
        signature == self.valid_mac.as_slice()
    }
}

pub struct Harness {
    pub state: ServerState,
    pub transport: FakeTransport,
    pub armed: Rc<Cell<Option<u64>>>,
    pub now: Rc<Cell<u64>>,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        let transport = FakeTransport::default();
        let scheduler = FakeScheduler::default();
        let armed = scheduler.armed.clone();
        let now = Rc::new(Cell::new(START_MS));
        let ports = Ports {
            transport: Box::new(transport.clone()),
            scheduler: Box::new(scheduler),
            clock: Box::new(FakeClock { now: now.clone() }),
            access: Box::new(AllowAll),
            verifier: Box::new(FakeVerifier {
                valid_mac: b"good-mac".to_vec(),
            }),
        };
        let state = ServerState::new(config, ports).expect("state builds");
        Self {
            state,
            transport,
            armed,
            now,
        }
    }

    pub fn ask(&mut self, id: u16, name: &str, qtype: u16) {
        let query = client_query(id, name, qtype, true);
        self.state
            .handle_client_datagram(client_addr(), &query)
            .expect("client datagram handled");
    }

    pub fn respond(&mut self, from: SocketAddr, bytes: &[u8]) {
        self.state
            .handle_upstream_datagram(from, bytes)
            .expect("upstream datagram handled");
    }

    /// Upstream datagrams sent since the last call.
    pub fn take_upstream(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        std::mem::take(&mut *self.transport.datagrams.borrow_mut())
    }

    pub fn take_streams(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        std::mem::take(&mut *self.transport.streams.borrow_mut())
    }

    /// Client replies sent since the last call, raw.
    pub fn take_client_bytes(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.transport.to_client.borrow_mut())
            .into_iter()
            .map(|(_, bytes)| bytes)
            .collect()
    }

    pub fn take_replies(&self) -> Vec<ParsedMessage> {
        self.take_client_bytes()
            .iter()
            .map(|bytes| ParsedMessage::parse(bytes).expect("reply parses"))
            .collect()
    }

    pub fn advance_ms(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    /// Moves the clock to the armed deadline and fires the timer.
    pub fn fire_timer(&mut self) -> u64 {
        let deadline = self.armed.get().expect("timer armed");
        if deadline > self.now.get() {
            self.now.set(deadline);
        }
        self.armed.set(None);
        self.state.handle_timer().expect("timer handled");
        deadline
    }
}
