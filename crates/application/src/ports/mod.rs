mod access_control;
mod clock;
mod record_visitor;
mod scheduler;
mod signature_verifier;
mod transport;

pub use access_control::{AccessControl, AllowAll};
pub use clock::Clock;
pub use record_visitor::{RecordVisitor, VisitedRecord};
pub use scheduler::Scheduler;
pub use signature_verifier::{RejectAll, SignatureVerifier};
pub use transport::Transport;

// Re-export for convenience
pub use lodestone_dns_domain::DnsQuery;
