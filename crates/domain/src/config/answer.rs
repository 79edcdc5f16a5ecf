use serde::{Deserialize, Serialize};

use crate::dns_name::DomainName;
use crate::dns_record::{RecordClass, RecordType};

/// How records of one RRset are ordered in an answer.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RrsetOrder {
    Fixed,
    #[default]
    Cyclic,
    Random,
}

impl RrsetOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Cyclic => "cyclic",
            Self::Random => "random",
        }
    }
}

/// An ordering rule. Unset fields match anything; `name` matches the owner
/// or any name below it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RrsetOrderRule {
    #[serde(default)]
    pub class: Option<String>,

    #[serde(default)]
    pub record_type: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    pub order: RrsetOrder,
}

impl RrsetOrderRule {
    pub fn matches(&self, class: RecordClass, record_type: RecordType, owner: &DomainName) -> bool {
        let class_ok = match &self.class {
            None => true,
            Some(c) => c.parse::<RecordClass>().map(|c| c == class).unwrap_or(false),
        };
        let type_ok = match &self.record_type {
            None => true,
            Some(t) => t
                .parse::<RecordType>()
                .map(|t| t == RecordType::ANY || t == record_type)
                .unwrap_or(false),
        };
        let name_ok = match &self.name {
            None => true,
            Some(n) if n == "*" => true,
            Some(n) => n
                .parse::<DomainName>()
                .map(|suffix| owner.is_subdomain_of(&suffix))
                .unwrap_or(false),
        };
        class_ok && type_ok && name_ok
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnswerConfig {
    #[serde(default)]
    pub default_order: RrsetOrder,

    #[serde(default)]
    pub rrset_order: Vec<RrsetOrderRule>,

    /// Largest UDP response honoured when a client advertises EDNS0.
    #[serde(default = "default_max_udp_size")]
    pub max_udp_size: u16,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            default_order: RrsetOrder::Cyclic,
            rrset_order: vec![],
            max_udp_size: default_max_udp_size(),
        }
    }
}

impl AnswerConfig {
    /// First matching rule wins; otherwise the default order applies.
    pub fn order_for(
        &self,
        class: RecordClass,
        record_type: RecordType,
        owner: &DomainName,
    ) -> RrsetOrder {
        self.rrset_order
            .iter()
            .find(|rule| rule.matches(class, record_type, owner))
            .map(|rule| rule.order)
            .unwrap_or(self.default_order)
    }
}

fn default_max_udp_size() -> u16 {
    4096
}
