use super::record::WireRecord;
use super::record_type_map::RecordTypeMapper;
use hickory_proto::op::{Header, Message, MessageType, Query};
use hickory_proto::rr::{Name, Record, RecordType as HickoryRecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder};
use lodestone_dns_domain::{DnsQuery, DomainError, DomainName, Opcode, ResponseCode};
use std::fmt;

pub const HEADER_LEN: usize = 12;

/// EDNS0 parameters carried by an OPT pseudo-record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdnsInfo {
    pub udp_size: u16,
    pub dnssec_ok: bool,
}

/// A transaction signature found as the last additional record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsigInfo {
    pub key_name: DomainName,
    /// The message as it was before signing: bytes up to the signature
    /// record, with the additional count reduced by one.
    pub signed_message: Vec<u8>,
    pub mac: Vec<u8>,
}

/// A fully decoded message. OPT and TSIG are lifted out of the additional
/// section into `edns` and `tsig`.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub header: Header,
    pub questions: Vec<DnsQuery>,
    pub answers: Vec<WireRecord>,
    pub authority: Vec<WireRecord>,
    pub additional: Vec<WireRecord>,
    pub edns: Option<EdnsInfo>,
    pub tsig: Option<TsigInfo>,
}

fn malformed(e: impl fmt::Display) -> DomainError {
    DomainError::MalformedMessage(e.to_string())
}

/// Reads just the fixed header, for datagrams whose body does not decode.
pub fn parse_header(buf: &[u8]) -> Result<Header, DomainError> {
    Header::read(&mut BinDecoder::new(buf)).map_err(malformed)
}

impl ParsedMessage {
    pub fn parse(buf: &[u8]) -> Result<Self, DomainError> {
        let message = Message::from_vec(buf).map_err(malformed)?;
        let mut parsed = Self::from_message(&message);
        let (edns, tsig) = read_pseudo_records(buf)?;
        parsed.edns = edns;
        parsed.tsig = tsig;
        Ok(parsed)
    }

    /// Section contents of an already decoded message. EDNS and TSIG are
    /// only filled in by [`ParsedMessage::parse`].
    pub fn from_message(message: &Message) -> Self {
        let records = |section: &[Record]| -> Vec<WireRecord> {
            section
                .iter()
                .filter(|r| {
                    !matches!(
                        r.record_type(),
                        HickoryRecordType::OPT | HickoryRecordType::TSIG | HickoryRecordType::SIG
                    )
                })
                .map(WireRecord::from_hickory)
                .collect()
        };
        Self {
            header: message.header().clone(),
            questions: message.queries().iter().map(question_of).collect(),
            answers: records(message.answers()),
            authority: records(message.name_servers()),
            additional: records(message.additionals()),
            edns: None,
            tsig: None,
        }
    }

    pub fn question(&self) -> Option<&DnsQuery> {
        self.questions.first()
    }

    pub fn id(&self) -> u16 {
        self.header.id()
    }

    pub fn is_response(&self) -> bool {
        self.header.message_type() == MessageType::Response
    }

    pub fn opcode(&self) -> Opcode {
        RecordTypeMapper::opcode_from_hickory(self.header.op_code())
    }

    pub fn rcode(&self) -> ResponseCode {
        RecordTypeMapper::rcode_from_hickory(self.header.response_code())
    }

    pub fn authoritative(&self) -> bool {
        self.header.authoritative()
    }

    pub fn truncated(&self) -> bool {
        self.header.truncated()
    }

    pub fn recursion_desired(&self) -> bool {
        self.header.recursion_desired()
    }

    pub fn recursion_available(&self) -> bool {
        self.header.recursion_available()
    }
}

fn question_of(query: &Query) -> DnsQuery {
    DnsQuery::with_class(
        DomainName::from(query.name().clone()),
        RecordTypeMapper::from_hickory(query.query_type()),
        RecordTypeMapper::class_from_hickory(query.query_class()),
    )
}

fn count_at(buf: &[u8], at: usize) -> Result<u16, DomainError> {
    buf.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| malformed("short header"))
}

/// Walks the additional section for the OPT and TSIG pseudo-records. There
/// may be one OPT; a TSIG must come last.
fn read_pseudo_records(buf: &[u8]) -> Result<(Option<EdnsInfo>, Option<TsigInfo>), DomainError> {
    let qdcount = count_at(buf, 4)?;
    let ancount = count_at(buf, 6)?;
    let nscount = count_at(buf, 8)?;
    let arcount = count_at(buf, 10)?;

    let mut decoder = BinDecoder::new(buf);
    decoder.read_slice(HEADER_LEN).map_err(malformed)?;
    for _ in 0..qdcount {
        Query::read(&mut decoder).map_err(malformed)?;
    }
    for _ in 0..u32::from(ancount) + u32::from(nscount) {
        Record::read(&mut decoder).map_err(malformed)?;
    }

    let mut edns = None;
    let mut tsig = None;
    for index in 0..arcount {
        let start = decoder.index();
        let record = Record::read(&mut decoder).map_err(malformed)?;
        match record.record_type() {
            HickoryRecordType::OPT => {
                if edns.is_some() {
                    return Err(malformed("more than one OPT record"));
                }
                edns = Some(EdnsInfo {
                    udp_size: u16::from(record.dns_class()),
                    dnssec_ok: record.ttl() & 0x0000_8000 != 0,
                });
            }
            HickoryRecordType::TSIG => {
                if index + 1 != arcount {
                    return Err(malformed("TSIG is not the last record"));
                }
                tsig = Some(read_tsig(buf, start, arcount)?);
            }
            _ => {}
        }
    }
    Ok((edns, tsig))
}

fn read_tsig(buf: &[u8], start: usize, arcount: u16) -> Result<TsigInfo, DomainError> {
    let mut decoder = BinDecoder::new(buf);
    decoder.read_slice(start).map_err(malformed)?;
    let key_name = Name::read(&mut decoder).map_err(malformed)?;
    // type, class, ttl, rdlength
    decoder.read_slice(10).map_err(malformed)?;
    // algorithm name, time signed (6), fudge (2), mac size (2), mac
    Name::read(&mut decoder).map_err(malformed)?;
    decoder.read_slice(8).map_err(malformed)?;
    let mac_len = decoder.read_u16().map_err(malformed)?.unverified();
    let mac = decoder
        .read_slice(usize::from(mac_len))
        .map_err(malformed)?
        .unverified()
        .to_vec();

    let mut signed_message = buf[..start].to_vec();
    signed_message[10..12].copy_from_slice(&arcount.saturating_sub(1).to_be_bytes());
    Ok(TsigInfo {
        key_name: DomainName::from(key_name),
        signed_message,
        mac,
    })
}
