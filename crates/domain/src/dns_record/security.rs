use serde::{Deserialize, Serialize};

/// DNSSEC verdict attached to stored data. The core carries it; the
/// verification collaborator sets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SecurityState {
    #[default]
    Unchecked,
    Secure,
    Insecure,
    Bogus,
}

impl SecurityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityState::Unchecked => "unchecked",
            SecurityState::Secure => "secure",
            SecurityState::Insecure => "insecure",
            SecurityState::Bogus => "bogus",
        }
    }
}
