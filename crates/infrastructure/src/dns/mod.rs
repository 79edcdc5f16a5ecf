pub mod answer;
pub mod cache;
pub mod cache_updater;
pub mod forwarding;
pub mod resolver;
pub mod server;
pub mod state;
pub mod wire;

pub use answer::{Answer, AnswerBuilder, AnswerOutcome};
pub use cache::{NameStore, NegativeCache, Table};
pub use cache_updater::{CacheUpdater, RecordPattern, UpdateFlags};
pub use forwarding::{Forwarder, QueryTracker, ServerStats};
pub use resolver::{ResponseValidator, Verdict};
pub use server::{serve, DnsServer, SystemClock};
pub use state::{Ports, ServerState};
