//! Message builders for the tests. Upstream replies are assembled as
//! `hickory_proto` messages, so the crate's parser sees encodings it did
//! not produce itself.

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::{A, CNAME, MX, NS, SOA};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};
use lodestone_dns_domain::Config;
use std::net::Ipv4Addr;

pub const TYPE_A: u16 = 1;
pub const TYPE_NS: u16 = 2;
pub const TYPE_MX: u16 = 15;
pub const TYPE_AAAA: u16 = 28;
pub const TYPE_AXFR: u16 = 252;

pub const RCODE_NOERROR: u8 = 0;
pub const RCODE_FORMERR: u8 = 1;
pub const RCODE_SERVFAIL: u8 = 2;
pub const RCODE_NXDOMAIN: u8 = 3;
pub const RCODE_NOTIMP: u8 = 4;
pub const RCODE_REFUSED: u8 = 5;

pub fn hickory_name(name: &str) -> Name {
    Name::from_ascii(name).expect("valid test name")
}

pub fn a_rdata(octets: [u8; 4]) -> RData {
    RData::A(A(Ipv4Addr::from(octets)))
}

pub fn ns_rdata(target: &str) -> RData {
    RData::NS(NS(hickory_name(target)))
}

pub fn cname_rdata(target: &str) -> RData {
    RData::CNAME(CNAME(hickory_name(target)))
}

pub fn mx_rdata(preference: u16, exchange: &str) -> RData {
    RData::MX(MX::new(preference, hickory_name(exchange)))
}

pub fn soa_rdata(zone: &str, serial: u32, minimum: u32) -> RData {
    RData::SOA(SOA::new(
        hickory_name(&format!("ns1.{}", zone)),
        hickory_name(&format!("hostmaster.{}", zone)),
        serial,
        3600,
        900,
        604_800,
        minimum,
    ))
}

pub fn encode(message: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(512);
    let mut encoder = BinEncoder::new(&mut buf);
    message.emit(&mut encoder).expect("test message encodes");
    buf
}

pub fn question(name: &str, qtype: u16) -> Query {
    let mut query = Query::new();
    query.set_name(hickory_name(name));
    query.set_query_type(RecordType::from(qtype));
    query.set_query_class(DNSClass::IN);
    query
}

/// A client query with one question and no OPT record, before encoding.
pub fn client_message(id: u16, name: &str, qtype: u16, rd: bool) -> Message {
    let mut message = Message::new(id, MessageType::Query, OpCode::Query);
    message.set_recursion_desired(rd);
    message.add_query(question(name, qtype));
    message
}

pub fn client_query(id: u16, name: &str, qtype: u16, rd: bool) -> Vec<u8> {
    encode(&client_message(id, name, qtype, rd))
}

pub fn message_id(message: &[u8]) -> u16 {
    u16::from_be_bytes([message[0], message[1]])
}

pub fn rcode_of(message: &[u8]) -> u8 {
    message[3] & 0x0f
}

pub fn recursion_desired(message: &[u8]) -> bool {
    message[2] & 0x01 != 0
}

/// Builds the reply an upstream server would send to `query`.
pub struct ResponseBuilder {
    message: Message,
}

impl ResponseBuilder {
    pub fn reply_to(query: &[u8]) -> Self {
        let request = Message::from_vec(query).expect("query parses");
        let mut message = Message::new(request.id(), MessageType::Response, OpCode::Query);
        message.set_recursion_desired(request.recursion_desired());
        message.set_recursion_available(true);
        for q in request.queries() {
            message.add_query(q.clone());
        }
        Self { message }
    }

    pub fn with_id(mut self, id: u16) -> Self {
        let mut header = *self.message.header();
        header.set_id(id);
        self.message.set_header(header);
        self
    }

    pub fn rcode(mut self, rcode: u8) -> Self {
        self.message.set_response_code(ResponseCode::from_low(rcode));
        self
    }

    pub fn authoritative(mut self) -> Self {
        self.message.set_authoritative(true);
        self
    }

    pub fn truncated(mut self) -> Self {
        self.message.set_truncated(true);
        self
    }

    pub fn answer(mut self, name: &str, ttl: u32, rdata: RData) -> Self {
        self.message.add_answer(Record::from_rdata(hickory_name(name), ttl, rdata));
        self
    }

    pub fn authority(mut self, name: &str, ttl: u32, rdata: RData) -> Self {
        self.message.add_name_server(Record::from_rdata(hickory_name(name), ttl, rdata));
        self
    }

    pub fn additional(mut self, name: &str, ttl: u32, rdata: RData) -> Self {
        self.message.add_additional(Record::from_rdata(hickory_name(name), ttl, rdata));
        self
    }

    pub fn build(self) -> Vec<u8> {
        encode(&self.message)
    }
}

/// Configuration for a resolver that only forwards, to `forwarders`.
pub fn forwarding_config(forwarders: &[&str]) -> Config {
    let mut config = Config::default();
    config.resolver.forwarders = forwarders.iter().map(|s| s.to_string()).collect();
    config.resolver.forward_only = true;
    config
}

/// Configuration for an iterating resolver with the given root hints.
pub fn iterative_config(hints: &[(&str, &str)]) -> Config {
    let mut config = Config::default();
    config.resolver.root_hints = hints
        .iter()
        .map(|(name, address)| lodestone_dns_domain::RootHint {
            name: name.to_string(),
            address: address.to_string(),
        })
        .collect();
    config
}
