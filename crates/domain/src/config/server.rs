use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address client queries arrive on.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Local address upstream queries are sent from.
    #[serde(default = "default_upstream_bind_address")]
    pub upstream_bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            upstream_bind_address: default_upstream_bind_address(),
        }
    }
}

fn default_listen_address() -> String {
    "0.0.0.0:53".to_string()
}

fn default_upstream_bind_address() -> String {
    "0.0.0.0:0".to_string()
}
