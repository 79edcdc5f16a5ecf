#![allow(dead_code)]
use lodestone_dns_domain::{Config, DomainName, TopologyRule};

pub fn name(s: &str) -> DomainName {
    s.parse().unwrap()
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn forwarders(mut self, forwarders: &[&str]) -> Self {
        self.config.resolver.forwarders = forwarders.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn forward_only(mut self, forward_only: bool) -> Self {
        self.config.resolver.forward_only = forward_only;
        self
    }

    pub fn cache_ttl_bounds(mut self, min: u32, max: u32) -> Self {
        self.config.cache.min_cache_ttl = min;
        self.config.cache.max_cache_ttl = max;
        self
    }

    pub fn topology(mut self, network: &str, distance: u8) -> Self {
        self.config.resolver.topology.push(TopologyRule {
            network: network.to_string(),
            distance,
        });
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
