use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

use super::errors::ConfigError;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RootHint {
    pub name: String,
    pub address: String,
}

/// Preference adjustment for servers inside `network`. Lower distance is
/// preferred when RTT buckets tie.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TopologyRule {
    pub network: String,
    pub distance: u8,
}

/// Opaque key handle for a server whose responses must carry a signature.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerKey {
    pub server: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    #[serde(default = "default_true")]
    pub recursion: bool,

    #[serde(default)]
    pub forwarders: Vec<String>,

    #[serde(default)]
    pub forward_only: bool,

    #[serde(default = "default_root_hints")]
    pub root_hints: Vec<RootHint>,

    #[serde(default = "default_min_root_servers")]
    pub min_root_servers: usize,

    #[serde(default = "default_priming_retry_secs")]
    pub priming_retry_secs: u64,

    #[serde(default = "default_max_retries_per_server")]
    pub max_retries_per_server: u8,

    #[serde(default = "default_query_lifetime_secs")]
    pub query_lifetime_secs: u64,

    #[serde(default = "default_max_cname_chain")]
    pub max_cname_chain: usize,

    #[serde(default = "default_max_subqueries")]
    pub max_subqueries: usize,

    #[serde(default)]
    pub topology: Vec<TopologyRule>,

    #[serde(default)]
    pub server_keys: Vec<ServerKey>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            recursion: true,
            forwarders: vec![],
            forward_only: false,
            root_hints: default_root_hints(),
            min_root_servers: default_min_root_servers(),
            priming_retry_secs: default_priming_retry_secs(),
            max_retries_per_server: default_max_retries_per_server(),
            query_lifetime_secs: default_query_lifetime_secs(),
            max_cname_chain: default_max_cname_chain(),
            max_subqueries: default_max_subqueries(),
            topology: vec![],
            server_keys: vec![],
        }
    }
}

impl ResolverConfig {
    /// Forwarder addresses; a bare IP gets port 53.
    pub fn forwarder_addrs(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        self.forwarders
            .iter()
            .map(|s| parse_server_addr(s))
            .collect()
    }

    pub fn topology_networks(&self) -> Result<Vec<(IpNetwork, u8)>, ConfigError> {
        self.topology
            .iter()
            .map(|rule| {
                rule.network
                    .parse::<IpNetwork>()
                    .map(|net| (net, rule.distance))
                    .map_err(|e| {
                        ConfigError::Validation(format!(
                            "Invalid topology network '{}': {}",
                            rule.network, e
                        ))
                    })
            })
            .collect()
    }

    pub fn server_key_addrs(&self) -> Result<Vec<(SocketAddr, String)>, ConfigError> {
        self.server_keys
            .iter()
            .map(|k| parse_server_addr(&k.server).map(|addr| (addr, k.key.clone())))
            .collect()
    }
}

pub fn parse_server_addr(s: &str) -> Result<SocketAddr, ConfigError> {
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }
    s.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, 53))
        .map_err(|e| ConfigError::Validation(format!("Invalid server address '{}': {}", s, e)))
}

fn default_true() -> bool {
    true
}

fn default_min_root_servers() -> usize {
    2
}

fn default_priming_retry_secs() -> u64 {
    30
}

fn default_max_retries_per_server() -> u8 {
    3
}

fn default_query_lifetime_secs() -> u64 {
    120
}

fn default_max_cname_chain() -> usize {
    8
}

fn default_max_subqueries() -> usize {
    20
}

fn default_root_hints() -> Vec<RootHint> {
    [
        ("a.root-servers.net.", "198.41.0.4"),
        ("b.root-servers.net.", "170.247.170.2"),
        ("c.root-servers.net.", "192.33.4.12"),
        ("d.root-servers.net.", "199.7.91.13"),
        ("e.root-servers.net.", "192.203.230.10"),
        ("f.root-servers.net.", "192.5.5.241"),
        ("g.root-servers.net.", "192.112.36.4"),
        ("h.root-servers.net.", "198.97.190.53"),
        ("i.root-servers.net.", "192.36.148.17"),
        ("j.root-servers.net.", "192.58.128.30"),
        ("k.root-servers.net.", "193.0.14.129"),
        ("l.root-servers.net.", "199.7.83.42"),
        ("m.root-servers.net.", "202.12.27.33"),
    ]
    .iter()
    .map(|(name, address)| RootHint {
        name: name.to_string(),
        address: address.to_string(),
    })
    .collect()
}
