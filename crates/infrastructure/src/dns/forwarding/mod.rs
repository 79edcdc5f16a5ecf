pub mod forwarder;
pub mod query;
pub mod server_stats;

pub use forwarder::{addresses_of, CandidateSet, Forwarder};
pub use query::{
    Candidate, ClientKey, ClientRequest, Query, QueryId, QueryPurpose, QueryState, QueryTracker,
    TimerKey,
};
pub use server_stats::ServerStats;
