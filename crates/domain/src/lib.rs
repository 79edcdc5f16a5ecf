//! Lodestone DNS Domain Layer
pub mod config;
pub mod credibility;
pub mod dns_name;
pub mod dns_protocol;
pub mod dns_query;
pub mod dns_record;
pub mod errors;

pub use config::{
    AnswerConfig, CacheConfig, Config, ConfigError, LoggingConfig, ResolverConfig, RootHint, RrsetOrder,
    RrsetOrderRule, ServerConfig, ServerKey, TopologyRule,
};
pub use credibility::Credibility;
pub use dns_name::DomainName;
pub use dns_protocol::{Opcode, ResponseCode};
pub use dns_query::DnsQuery;
pub use dns_record::{RecordClass, RecordType, SecurityState};
pub use errors::DomainError;
