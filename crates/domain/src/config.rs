pub mod answer;
pub mod cache;
pub mod errors;
pub mod logging;
pub mod resolver;
pub mod root;
pub mod server;

pub use answer::{AnswerConfig, RrsetOrder, RrsetOrderRule};
pub use cache::CacheConfig;
pub use errors::ConfigError;
pub use logging::LoggingConfig;
pub use resolver::{parse_server_addr, ResolverConfig, RootHint, ServerKey, TopologyRule};
pub use root::Config;
pub use server::ServerConfig;
