use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    MB,
    MG,
    MR,
    NULL,
    WKS,
    PTR,
    HINFO,
    MINFO,
    MX,
    TXT,
    RP,
    AFSDB,
    SIG,
    KEY,
    AAAA,
    NXT,
    SRV,
    NAPTR,
    KX,
    DNAME,
    OPT,
    DS,
    SSHFP,
    RRSIG,
    NSEC,
    DNSKEY,
    NSEC3,
    NSEC3PARAM,
    TLSA,
    SVCB,
    HTTPS,
    TSIG,
    IXFR,
    AXFR,
    MAILB,
    ANY,
    CAA,
    Unknown(u16),
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::NS => "NS",
            RecordType::CNAME => "CNAME",
            RecordType::SOA => "SOA",
            RecordType::MB => "MB",
            RecordType::MG => "MG",
            RecordType::MR => "MR",
            RecordType::NULL => "NULL",
            RecordType::WKS => "WKS",
            RecordType::PTR => "PTR",
            RecordType::HINFO => "HINFO",
            RecordType::MINFO => "MINFO",
            RecordType::MX => "MX",
            RecordType::TXT => "TXT",
            RecordType::RP => "RP",
            RecordType::AFSDB => "AFSDB",
            RecordType::SIG => "SIG",
            RecordType::KEY => "KEY",
            RecordType::AAAA => "AAAA",
            RecordType::NXT => "NXT",
            RecordType::SRV => "SRV",
            RecordType::NAPTR => "NAPTR",
            RecordType::KX => "KX",
            RecordType::DNAME => "DNAME",
            RecordType::OPT => "OPT",
            RecordType::DS => "DS",
            RecordType::SSHFP => "SSHFP",
            RecordType::RRSIG => "RRSIG",
            RecordType::NSEC => "NSEC",
            RecordType::DNSKEY => "DNSKEY",
            RecordType::NSEC3 => "NSEC3",
            RecordType::NSEC3PARAM => "NSEC3PARAM",
            RecordType::TLSA => "TLSA",
            RecordType::SVCB => "SVCB",
            RecordType::HTTPS => "HTTPS",
            RecordType::TSIG => "TSIG",
            RecordType::IXFR => "IXFR",
            RecordType::AXFR => "AXFR",
            RecordType::MAILB => "MAILB",
            RecordType::ANY => "ANY",
            RecordType::CAA => "CAA",
            RecordType::Unknown(_) => "UNKNOWN",
        }
    }

    pub fn to_u16(&self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::MB => 7,
            RecordType::MG => 8,
            RecordType::MR => 9,
            RecordType::NULL => 10,
            RecordType::WKS => 11,
            RecordType::PTR => 12,
            RecordType::HINFO => 13,
            RecordType::MINFO => 14,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::RP => 17,
            RecordType::AFSDB => 18,
            RecordType::SIG => 24,
            RecordType::KEY => 25,
            RecordType::AAAA => 28,
            RecordType::NXT => 30,
            RecordType::SRV => 33,
            RecordType::NAPTR => 35,
            RecordType::KX => 36,
            RecordType::DNAME => 39,
            RecordType::OPT => 41,
            RecordType::DS => 43,
            RecordType::SSHFP => 44,
            RecordType::RRSIG => 46,
            RecordType::NSEC => 47,
            RecordType::DNSKEY => 48,
            RecordType::NSEC3 => 50,
            RecordType::NSEC3PARAM => 51,
            RecordType::TLSA => 52,
            RecordType::SVCB => 64,
            RecordType::HTTPS => 65,
            RecordType::TSIG => 250,
            RecordType::IXFR => 251,
            RecordType::AXFR => 252,
            RecordType::MAILB => 253,
            RecordType::ANY => 255,
            RecordType::CAA => 257,
            RecordType::Unknown(code) => *code,
        }
    }

    pub fn from_u16(code: u16) -> Self {
        match code {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            7 => RecordType::MB,
            8 => RecordType::MG,
            9 => RecordType::MR,
            10 => RecordType::NULL,
            11 => RecordType::WKS,
            12 => RecordType::PTR,
            13 => RecordType::HINFO,
            14 => RecordType::MINFO,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            17 => RecordType::RP,
            18 => RecordType::AFSDB,
            24 => RecordType::SIG,
            25 => RecordType::KEY,
            28 => RecordType::AAAA,
            30 => RecordType::NXT,
            33 => RecordType::SRV,
            35 => RecordType::NAPTR,
            36 => RecordType::KX,
            39 => RecordType::DNAME,
            41 => RecordType::OPT,
            43 => RecordType::DS,
            44 => RecordType::SSHFP,
            46 => RecordType::RRSIG,
            47 => RecordType::NSEC,
            48 => RecordType::DNSKEY,
            50 => RecordType::NSEC3,
            51 => RecordType::NSEC3PARAM,
            52 => RecordType::TLSA,
            64 => RecordType::SVCB,
            65 => RecordType::HTTPS,
            250 => RecordType::TSIG,
            251 => RecordType::IXFR,
            252 => RecordType::AXFR,
            253 => RecordType::MAILB,
            255 => RecordType::ANY,
            257 => RecordType::CAA,
            other => RecordType::Unknown(other),
        }
    }

    /// Types allowed to share an owner name with a CNAME.
    pub fn is_dnssec_metadata(&self) -> bool {
        matches!(
            self,
            RecordType::SIG
                | RecordType::NXT
                | RecordType::KEY
                | RecordType::RRSIG
                | RecordType::NSEC
                | RecordType::NSEC3
        )
    }

    pub fn is_signature(&self) -> bool {
        matches!(self, RecordType::SIG | RecordType::RRSIG)
    }

    /// Types that may legitimately appear as glue at a zone cut.
    pub fn is_valid_glue(&self) -> bool {
        matches!(self, RecordType::NS | RecordType::A | RecordType::AAAA)
    }

    /// Types of which an owner may hold at most one record per class.
    pub fn is_singleton(&self) -> bool {
        matches!(self, RecordType::CNAME | RecordType::WKS)
    }

    pub fn is_address(&self) -> bool {
        matches!(self, RecordType::A | RecordType::AAAA)
    }

    /// Meta types that only make sense in a question.
    pub fn is_query_only(&self) -> bool {
        matches!(
            self,
            RecordType::IXFR | RecordType::AXFR | RecordType::MAILB | RecordType::ANY
        )
    }

    /// True when a question for `self` is answered by stored data of type `stored`.
    pub fn matches(&self, stored: RecordType) -> bool {
        match self {
            RecordType::ANY => !stored.is_query_only(),
            RecordType::MAILB => {
                matches!(stored, RecordType::MB | RecordType::MG | RecordType::MR)
            }
            other => *other == stored,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::Unknown(code) => write!(f, "TYPE{}", code),
            other => f.write_str(other.as_str()),
        }
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_uppercase();
        let known = match upper.as_str() {
            "A" => Some(RecordType::A),
            "NS" => Some(RecordType::NS),
            "CNAME" => Some(RecordType::CNAME),
            "SOA" => Some(RecordType::SOA),
            "MB" => Some(RecordType::MB),
            "MG" => Some(RecordType::MG),
            "MR" => Some(RecordType::MR),
            "NULL" => Some(RecordType::NULL),
            "WKS" => Some(RecordType::WKS),
            "PTR" => Some(RecordType::PTR),
            "HINFO" => Some(RecordType::HINFO),
            "MINFO" => Some(RecordType::MINFO),
            "MX" => Some(RecordType::MX),
            "TXT" => Some(RecordType::TXT),
            "RP" => Some(RecordType::RP),
            "AFSDB" => Some(RecordType::AFSDB),
            "SIG" => Some(RecordType::SIG),
            "KEY" => Some(RecordType::KEY),
            "AAAA" => Some(RecordType::AAAA),
            "NXT" => Some(RecordType::NXT),
            "SRV" => Some(RecordType::SRV),
            "NAPTR" => Some(RecordType::NAPTR),
            "KX" => Some(RecordType::KX),
            "DNAME" => Some(RecordType::DNAME),
            "OPT" => Some(RecordType::OPT),
            "DS" => Some(RecordType::DS),
            "SSHFP" => Some(RecordType::SSHFP),
            "RRSIG" => Some(RecordType::RRSIG),
            "NSEC" => Some(RecordType::NSEC),
            "DNSKEY" => Some(RecordType::DNSKEY),
            "NSEC3" => Some(RecordType::NSEC3),
            "NSEC3PARAM" => Some(RecordType::NSEC3PARAM),
            "TLSA" => Some(RecordType::TLSA),
            "SVCB" => Some(RecordType::SVCB),
            "HTTPS" => Some(RecordType::HTTPS),
            "TSIG" => Some(RecordType::TSIG),
            "IXFR" => Some(RecordType::IXFR),
            "AXFR" => Some(RecordType::AXFR),
            "MAILB" => Some(RecordType::MAILB),
            "ANY" | "*" => Some(RecordType::ANY),
            "CAA" => Some(RecordType::CAA),
            _ => None,
        };
        known
            .or_else(|| {
                upper
                    .strip_prefix("TYPE")
                    .and_then(|n| n.parse::<u16>().ok())
                    .map(RecordType::from_u16)
            })
            .ok_or_else(|| format!("Unknown record type: {}", s))
    }
}
