//! Helpers over `hickory_proto` record data.

use hickory_proto::rr::rdata::{A, AAAA, CNAME, NS, SOA};
use hickory_proto::rr::{RData, SerialNumber};
use lodestone_dns_domain::DomainName;
use std::net::IpAddr;

pub fn address_rdata(addr: IpAddr) -> RData {
    match addr {
        IpAddr::V4(ip) => RData::A(A(ip)),
        IpAddr::V6(ip) => RData::AAAA(AAAA(ip)),
    }
}

pub fn address_from_rdata(rdata: &RData) -> Option<IpAddr> {
    match rdata {
        RData::A(a) => Some(IpAddr::V4(a.0)),
        RData::AAAA(aaaa) => Some(IpAddr::V6(aaaa.0)),
        _ => None,
    }
}

pub fn ns_rdata(name: &DomainName) -> RData {
    RData::NS(NS(name.as_hickory().clone()))
}

pub fn cname_rdata(name: &DomainName) -> RData {
    RData::CNAME(CNAME(name.as_hickory().clone()))
}

/// The name a CNAME, NS or PTR record points at.
pub fn first_name(rdata: &RData) -> Option<DomainName> {
    match rdata {
        RData::CNAME(cname) => Some(DomainName::from(cname.0.clone())),
        RData::NS(ns) => Some(DomainName::from(ns.0.clone())),
        RData::PTR(ptr) => Some(DomainName::from(ptr.0.clone())),
        _ => None,
    }
}

/// Name whose addresses belong in the additional section.
pub fn additional_target(rdata: &RData) -> Option<DomainName> {
    match rdata {
        RData::NS(ns) => Some(DomainName::from(ns.0.clone())),
        RData::MX(mx) => Some(DomainName::from(mx.exchange().clone())),
        RData::SRV(srv) => Some(DomainName::from(srv.target().clone())),
        _ => None,
    }
}

pub fn soa_of(rdata: &RData) -> Option<&SOA> {
    match rdata {
        RData::SOA(soa) => Some(soa),
        _ => None,
    }
}

/// Sequence-space comparison of zone serials.
pub fn serial_newer(candidate: u32, current: u32) -> bool {
    SerialNumber::from(candidate) > SerialNumber::from(current)
}
