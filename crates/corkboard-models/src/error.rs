//! The shared error taxonomy for Corkboard operations.
//!
//! Transition refusals are typed per operation so callers can distinguish
//! "the record is not in a state that permits this" from infrastructure
//! failures. Each variant has a stable kind string for wire/API consumers.

use thiserror::Error;

/// Result type alias for Corkboard operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by Corkboard store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("cannot claim actual LRP")]
    ActualLrpCannotBeClaimed,

    #[error("cannot start actual LRP")]
    ActualLrpCannotBeStarted,

    #[error("cannot crash actual LRP")]
    ActualLrpCannotBeCrashed,

    #[error("cannot fail actual LRP")]
    ActualLrpCannotBeFailed,

    #[error("cannot remove actual LRP")]
    ActualLrpCannotBeRemoved,

    #[error("cannot stop actual LRP")]
    ActualLrpCannotBeStopped,

    #[error("the requested resource could not be found")]
    ResourceNotFound,

    #[error("resource conflict: {0}")]
    ResourceConflict(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("invalid domain")]
    InvalidDomain,

    #[error("could not serialize JSON: {0}")]
    Serialize(String),

    #[error("could not deserialize JSON: {0}")]
    Deserialize(String),

    #[error("the request failed for an unknown reason: {0}")]
    UnknownError(String),
}

impl Error {
    /// Stable kind identifier, independent of any message payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ActualLrpCannotBeClaimed => "ActualLRPCannotBeClaimed",
            Error::ActualLrpCannotBeStarted => "ActualLRPCannotBeStarted",
            Error::ActualLrpCannotBeCrashed => "ActualLRPCannotBeCrashed",
            Error::ActualLrpCannotBeFailed => "ActualLRPCannotBeFailed",
            Error::ActualLrpCannotBeRemoved => "ActualLRPCannotBeRemoved",
            Error::ActualLrpCannotBeStopped => "ActualLRPCannotBeStopped",
            Error::ResourceNotFound => "ResourceNotFound",
            Error::ResourceConflict(_) => "ResourceConflict",
            Error::InvalidRecord(_) => "InvalidRecord",
            Error::InvalidDomain => "InvalidDomain",
            Error::Serialize(_) => "InvalidJSON",
            Error::Deserialize(_) => "InvalidJSON",
            Error::UnknownError(_) => "UnknownError",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Deserialize(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_stable_across_payloads() {
        let a = Error::ResourceConflict("claim".into());
        let b = Error::ResourceConflict("start".into());
        assert_ne!(a, b);
        assert_eq!(a.kind(), b.kind());
    }

    #[test]
    fn refusal_messages_match_the_wire_contract() {
        assert_eq!(Error::ActualLrpCannotBeClaimed.to_string(), "cannot claim actual LRP");
        assert_eq!(
            Error::ResourceNotFound.to_string(),
            "the requested resource could not be found"
        );
    }
}
