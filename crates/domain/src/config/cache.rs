use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Lower bound, in seconds, applied to positive cache insertions.
    #[serde(default = "default_min_cache_ttl")]
    pub min_cache_ttl: u32,

    /// Upper bound, in seconds, applied to every cache insertion.
    #[serde(default = "default_max_cache_ttl")]
    pub max_cache_ttl: u32,

    /// Ceiling for NXDOMAIN / NODATA entries.
    #[serde(default = "default_max_negative_ttl")]
    pub max_negative_ttl: u32,

    #[serde(default = "default_cleaning_interval_secs")]
    pub cleaning_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            min_cache_ttl: default_min_cache_ttl(),
            max_cache_ttl: default_max_cache_ttl(),
            max_negative_ttl: default_max_negative_ttl(),
            cleaning_interval_secs: default_cleaning_interval_secs(),
        }
    }
}

fn default_min_cache_ttl() -> u32 {
    0
}

fn default_max_cache_ttl() -> u32 {
    604_800
}

fn default_max_negative_ttl() -> u32 {
    10_800
}

fn default_cleaning_interval_secs() -> u64 {
    3600
}
