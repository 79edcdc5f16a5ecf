use serde::{Deserialize, Serialize};
use std::fmt;

/// Trust rank of a stored record. All cache conflicts are decided on this
/// ordering first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Credibility {
    #[default]
    Cache = 0,
    Additional = 1,
    NonAuthAnswer = 2,
    AuthAnswer = 3,
    Zone = 4,
}

impl Credibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Credibility::Cache => "cache",
            Credibility::Additional => "additional",
            Credibility::NonAuthAnswer => "answer",
            Credibility::AuthAnswer => "auth-answer",
            Credibility::Zone => "zone",
        }
    }

    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// Credibility of a record taken from the answer section of a response.
    pub fn for_answer(authoritative: bool) -> Self {
        if authoritative {
            Credibility::AuthAnswer
        } else {
            Credibility::NonAuthAnswer
        }
    }
}

impl fmt::Display for Credibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
