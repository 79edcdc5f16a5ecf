//! Message encoding and decoding on top of `hickory-proto`.

pub mod message;
pub mod message_builder;
pub mod rdata;
pub mod record;
pub mod record_type_map;

pub use message::{parse_header, EdnsInfo, ParsedMessage, TsigInfo, HEADER_LEN};
pub use message_builder::{MessageBuilder, ResponseHead, ResponseSections, DEFAULT_UDP_SIZE, UPSTREAM_EDNS_SIZE};
pub use rdata::{serial_newer, soa_of};
pub use record::WireRecord;
pub use record_type_map::RecordTypeMapper;
