use serde::{Deserialize, Serialize};

use super::answer::AnswerConfig;
use super::cache::CacheConfig;
use super::errors::ConfigError;
use super::logging::LoggingConfig;
use super::resolver::{parse_server_addr, ResolverConfig};
use super::server::ServerConfig;

/// Main configuration structure for Lodestone
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Listening sockets
    #[serde(default)]
    pub server: ServerConfig,

    /// TTL clamps and cleaning cadence
    #[serde(default)]
    pub cache: CacheConfig,

    /// Upstream selection, retries and loop ceilings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Answer assembly
    #[serde(default)]
    pub answer: AnswerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file or use defaults
    ///
    /// Priority order:
    /// 1. Explicitly provided path
    /// 2. lodestone.toml in current directory
    /// 3. /etc/lodestone/config.toml
    /// 4. Default configuration
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let config = if let Some(path) = path {
            Self::from_file(path)?
        } else if let Some(found) = Self::get_config_path() {
            Self::from_file(&found)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.listen_address.parse::<std::net::SocketAddr>().map_err(|e| {
            ConfigError::Validation(format!(
                "Invalid listen address '{}': {}",
                self.server.listen_address, e
            ))
        })?;
        self.server
            .upstream_bind_address
            .parse::<std::net::SocketAddr>()
            .map_err(|e| {
                ConfigError::Validation(format!(
                    "Invalid upstream bind address '{}': {}",
                    self.server.upstream_bind_address, e
                ))
            })?;

        if self.cache.min_cache_ttl > self.cache.max_cache_ttl {
            return Err(ConfigError::Validation(format!(
                "min_cache_ttl ({}) exceeds max_cache_ttl ({})",
                self.cache.min_cache_ttl, self.cache.max_cache_ttl
            )));
        }
        if self.cache.min_cache_ttl > self.cache.max_negative_ttl {
            return Err(ConfigError::Validation(format!(
                "min_cache_ttl ({}) exceeds max_negative_ttl ({})",
                self.cache.min_cache_ttl, self.cache.max_negative_ttl
            )));
        }

        let resolver = &self.resolver;
        if resolver.forward_only && resolver.forwarders.is_empty() {
            return Err(ConfigError::Validation(
                "forward_only requires at least one forwarder".to_string(),
            ));
        }
        resolver.forwarder_addrs()?;
        resolver.topology_networks()?;
        resolver.server_key_addrs()?;

        if !resolver.forward_only {
            if resolver.root_hints.is_empty() {
                return Err(ConfigError::Validation("No root hints configured".to_string()));
            }
            for hint in &resolver.root_hints {
                parse_server_addr(&hint.address)?;
            }
        }

        if resolver.max_retries_per_server == 0 {
            return Err(ConfigError::Validation(
                "max_retries_per_server must be at least 1".to_string(),
            ));
        }
        if resolver.max_cname_chain == 0 || resolver.max_subqueries == 0 {
            return Err(ConfigError::Validation(
                "max_cname_chain and max_subqueries must be at least 1".to_string(),
            ));
        }

        if self.answer.max_udp_size < 512 {
            return Err(ConfigError::Validation(format!(
                "max_udp_size ({}) is below 512",
                self.answer.max_udp_size
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, toml_string)
            .map_err(|e| ConfigError::FileWrite(path.to_string(), e.to_string()))?;
        Ok(())
    }

    /// Get the path to the configuration file being used
    pub fn get_config_path() -> Option<String> {
        if std::path::Path::new("lodestone.toml").exists() {
            Some("lodestone.toml".to_string())
        } else if std::path::Path::new("/etc/lodestone/config.toml").exists() {
            Some("/etc/lodestone/config.toml".to_string())
        } else {
            None
        }
    }
}
