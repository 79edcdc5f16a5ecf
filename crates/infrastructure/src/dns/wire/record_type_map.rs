//! Mapping between the domain protocol enums and `hickory_proto`'s.
//!
//! Everything goes through the numeric codes, so types and classes hickory
//! has no variant for survive the trip as `Unknown`.

use hickory_proto::op::{OpCode, ResponseCode as HickoryResponseCode};
use hickory_proto::rr::{DNSClass, RecordType as HickoryRecordType};
use lodestone_dns_domain::{Opcode, RecordClass, RecordType, ResponseCode};

pub struct RecordTypeMapper;

impl RecordTypeMapper {
    pub fn to_hickory(record_type: RecordType) -> HickoryRecordType {
        HickoryRecordType::from(record_type.to_u16())
    }

    pub fn from_hickory(record_type: HickoryRecordType) -> RecordType {
        RecordType::from_u16(u16::from(record_type))
    }

    pub fn class_to_hickory(class: RecordClass) -> DNSClass {
        DNSClass::from(class.to_u16())
    }

    pub fn class_from_hickory(class: DNSClass) -> RecordClass {
        RecordClass::from_u16(u16::from(class))
    }

    pub fn opcode_from_hickory(op_code: OpCode) -> Opcode {
        Opcode::from_u8(u8::from(op_code))
    }

    pub fn rcode_to_hickory(rcode: ResponseCode) -> HickoryResponseCode {
        HickoryResponseCode::from_low(rcode.to_u8())
    }

    pub fn rcode_from_hickory(rcode: HickoryResponseCode) -> ResponseCode {
        ResponseCode::from_u8(rcode.low())
    }
}
