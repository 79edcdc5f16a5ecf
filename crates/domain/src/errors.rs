use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid domain name: {0}")]
    InvalidDomainName(String),

    #[error("Name not found")]
    NameNotFound,

    #[error("Update rejected by more credible data")]
    AuthorityViolation,

    #[error("Data already exists")]
    AlreadyExists,

    #[error("Data to update does not exist")]
    DataAbsent,

    #[error("Malformed DNS message: {0}")]
    MalformedMessage(String),

    #[error("All candidate servers are unreachable")]
    ServerUnreachable,

    #[error("Loop limit exceeded: {0}")]
    LoopLimitExceeded(String),

    #[error("Fatal invariant violation: {0}")]
    FatalInvariant(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl DomainError {
    /// True for the outcomes of a store update that leave the store untouched
    /// without indicating corruption.
    pub fn is_update_rejection(&self) -> bool {
        matches!(
            self,
            DomainError::NameNotFound
                | DomainError::AuthorityViolation
                | DomainError::AlreadyExists
                | DomainError::DataAbsent
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, DomainError::FatalInvariant(_))
    }
}
