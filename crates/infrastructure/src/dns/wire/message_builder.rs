//! Outgoing messages, built as `hickory_proto` messages and serialized
//! with its binary encoder.

use super::record::WireRecord;
use super::record_type_map::RecordTypeMapper;
use hickory_proto::op::{Edns, Header, Message, MessageType, OpCode, Query};
use hickory_proto::rr::Record;
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};
use lodestone_dns_domain::{DnsQuery, DomainError, ResponseCode};
use tracing::debug;

/// Classic UDP payload limit without EDNS0.
pub const DEFAULT_UDP_SIZE: usize = 512;

/// Payload size advertised on upstream queries.
pub const UPSTREAM_EDNS_SIZE: u16 = 1232;

/// The three record sections of a response.
#[derive(Debug, Clone, Default)]
pub struct ResponseSections {
    pub answers: Vec<WireRecord>,
    pub authority: Vec<WireRecord>,
    pub additional: Vec<WireRecord>,
}

/// Header fields of a response.
#[derive(Debug, Clone, Copy)]
pub struct ResponseHead {
    pub id: u16,
    pub op_code: OpCode,
    pub recursion_desired: bool,
    pub authoritative: bool,
    pub recursion_available: bool,
    pub rcode: ResponseCode,
}

impl ResponseHead {
    /// Reply to a standard query with id `id`.
    pub fn query_reply(id: u16, recursion_desired: bool, rcode: ResponseCode) -> Self {
        Self {
            id,
            op_code: OpCode::Query,
            recursion_desired,
            authoritative: false,
            recursion_available: false,
            rcode,
        }
    }

    /// Reply to whatever `request` asked, keeping its opcode.
    pub fn answering(request: &Header, rcode: ResponseCode) -> Self {
        Self {
            op_code: request.op_code(),
            ..Self::query_reply(request.id(), request.recursion_desired(), rcode)
        }
    }

    pub fn with_authoritative(mut self, authoritative: bool) -> Self {
        self.authoritative = authoritative;
        self
    }

    pub fn with_recursion_available(mut self, recursion_available: bool) -> Self {
        self.recursion_available = recursion_available;
        self
    }

    fn message(&self) -> Message {
        let mut message = Message::new(self.id, MessageType::Response, self.op_code);
        message.set_recursion_desired(self.recursion_desired);
        message.set_authoritative(self.authoritative);
        message.set_recursion_available(self.recursion_available);
        message.set_response_code(RecordTypeMapper::rcode_to_hickory(self.rcode));
        message
    }
}

#[derive(Clone, Copy)]
enum Section {
    Answer,
    Authority,
    Additional,
}

pub struct MessageBuilder;

impl MessageBuilder {
    /// Upstream query with a single question.
    pub fn build_query(
        id: u16,
        question: &DnsQuery,
        recursion_desired: bool,
        edns_size: Option<u16>,
    ) -> Result<Vec<u8>, DomainError> {
        let mut message = Message::new(id, MessageType::Query, OpCode::Query);
        message.set_recursion_desired(recursion_desired);
        message.add_query(Self::query(question));
        if let Some(size) = edns_size {
            message.set_edns(Self::edns(size));
        }
        Self::serialize_message(&message)
    }

    /// Response within `limit` bytes. Records are kept in section order up
    /// to the last one that fits; when any is dropped TC is set. When
    /// `edns_size` is given an OPT record is echoed and counts against the
    /// limit.
    pub fn build_response(
        head: ResponseHead,
        question: Option<&DnsQuery>,
        sections: &ResponseSections,
        limit: usize,
        edns_size: Option<u16>,
    ) -> Result<Vec<u8>, DomainError> {
        let records: Vec<(Section, Record)> = sections
            .answers
            .iter()
            .map(|r| (Section::Answer, r.to_hickory()))
            .chain(sections.authority.iter().map(|r| (Section::Authority, r.to_hickory())))
            .chain(sections.additional.iter().map(|r| (Section::Additional, r.to_hickory())))
            .collect();

        let encode = |kept: usize, truncated: bool| -> Result<Vec<u8>, DomainError> {
            let mut message = head.message();
            message.set_truncated(truncated);
            if let Some(question) = question {
                message.add_query(Self::query(question));
            }
            for (section, record) in records.iter().take(kept) {
                match section {
                    Section::Answer => message.add_answer(record.clone()),
                    Section::Authority => message.add_name_server(record.clone()),
                    Section::Additional => message.add_additional(record.clone()),
                };
            }
            if let Some(size) = edns_size {
                message.set_edns(Self::edns(size));
            }
            Self::serialize_message(&message)
        };

        let full = encode(records.len(), false)?;
        if full.len() <= limit {
            return Ok(full);
        }

        // Encoded length grows with every record kept, so the longest prefix
        // that fits can be found by bisection.
        let (mut fits, mut overflows) = (0usize, records.len());
        while overflows - fits > 1 {
            let mid = fits + (overflows - fits) / 2;
            if encode(mid, true)?.len() <= limit {
                fits = mid;
            } else {
                overflows = mid;
            }
        }
        debug!(
            id = head.id,
            kept = fits,
            dropped = records.len() - fits,
            limit,
            "Response truncated"
        );
        encode(fits, true)
    }

    /// Header-plus-question reply carrying only an error code. Falls back to
    /// a bare header when the question cannot be encoded.
    pub fn build_error(head: ResponseHead, question: Option<&DnsQuery>) -> Result<Vec<u8>, DomainError> {
        let mut message = head.message();
        if let Some(question) = question {
            message.add_query(Self::query(question));
        }
        match Self::serialize_message(&message) {
            Ok(bytes) => Ok(bytes),
            Err(e) if question.is_some() => {
                debug!(id = head.id, error = %e, "Question not encodable, replying without it");
                Self::serialize_message(&head.message())
            }
            Err(e) => Err(e),
        }
    }

    fn query(question: &DnsQuery) -> Query {
        let mut query = Query::new();
        query.set_name(question.name.as_hickory().clone());
        query.set_query_type(RecordTypeMapper::to_hickory(question.record_type));
        query.set_query_class(RecordTypeMapper::class_to_hickory(question.record_class));
        query
    }

    fn edns(udp_size: u16) -> Edns {
        let mut edns = Edns::new();
        edns.set_max_payload(udp_size);
        edns
    }

    fn serialize_message(message: &Message) -> Result<Vec<u8>, DomainError> {
        let mut buf = Vec::with_capacity(DEFAULT_UDP_SIZE);
        let mut encoder = BinEncoder::new(&mut buf);
        message
            .emit(&mut encoder)
            .map_err(|e| DomainError::MalformedMessage(format!("Failed to serialize DNS message: {}", e)))?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::wire::rdata::address_rdata;
    use crate::dns::wire::ParsedMessage;
    use lodestone_dns_domain::{DomainName, RecordClass, RecordType};
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_query_round_trips_through_parser() {
        let question = DnsQuery::new("example.org.".parse().unwrap(), RecordType::MX);
        let bytes = MessageBuilder::build_query(0x1234, &question, false, Some(1232)).unwrap();
        let parsed = ParsedMessage::parse(&bytes).unwrap();

        assert_eq!(parsed.id(), 0x1234);
        assert!(!parsed.is_response());
        assert!(!parsed.recursion_desired());
        assert_eq!(parsed.question(), Some(&question));
        assert_eq!(parsed.edns.map(|e| e.udp_size), Some(1232));
        assert!(parsed.additional.is_empty());
    }

    #[test]
    fn test_error_reply_echoes_question() {
        let question = DnsQuery::new("example.org.".parse().unwrap(), RecordType::A);
        let head = ResponseHead::query_reply(99, true, ResponseCode::ServFail).with_recursion_available(true);
        let bytes = MessageBuilder::build_error(head, Some(&question)).unwrap();
        let parsed = ParsedMessage::parse(&bytes).unwrap();
        assert_eq!(parsed.id(), 99);
        assert_eq!(parsed.rcode(), ResponseCode::ServFail);
        assert!(parsed.recursion_available());
        assert!(parsed.recursion_desired());
        assert_eq!(parsed.questions.len(), 1);
    }

    #[test]
    fn test_oversized_response_keeps_whole_records_and_sets_tc() {
        let owner: DomainName = "big.example.org.".parse().unwrap();
        let question = DnsQuery::new(owner.clone(), RecordType::A);
        let sections = ResponseSections {
            answers: (0..60u8)
                .map(|i| {
                    WireRecord::new(
                        owner.clone(),
                        RecordClass::IN,
                        300,
                        address_rdata(IpAddr::V4(Ipv4Addr::new(192, 0, 2, i))),
                    )
                })
                .collect(),
            ..ResponseSections::default()
        };
        let head = ResponseHead::query_reply(7, true, ResponseCode::NoError);

        let bytes = MessageBuilder::build_response(head, Some(&question), &sections, 512, None).unwrap();
        assert!(bytes.len() <= 512);
        let parsed = ParsedMessage::parse(&bytes).unwrap();
        assert!(parsed.truncated());
        assert!(!parsed.answers.is_empty());
        assert!(parsed.answers.len() < 60);
        assert_eq!(parsed.answers[0], sections.answers[0]);

        let roomy = MessageBuilder::build_response(head, Some(&question), &sections, 4096, None).unwrap();
        let parsed = ParsedMessage::parse(&roomy).unwrap();
        assert!(!parsed.truncated());
        assert_eq!(parsed.answers.len(), 60);
    }
}
