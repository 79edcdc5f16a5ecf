//! Client answers built from the name store.

mod builder;
mod ordering;

pub use builder::{Answer, AnswerBuilder, AnswerOutcome};
pub use ordering::{covered_type, order_rrset, signatures_last};
