mod priming;
mod validator;

pub use priming::{RootHints, HINT_TTL};
pub use validator::{ResponseValidator, RrsetGroup, Verdict};
