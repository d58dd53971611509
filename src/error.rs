//! Repository error taxonomy

use crate::config::ConfigError;
use crate::mapping::MappingError;
use crate::rdf::StoreError;
use crate::sparql::QueryError;
use thiserror::Error;

/// Errors surfaced by readers, writers and facades
#[derive(Error, Debug)]
pub enum RepoError {
    /// Object or identifier absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create on a subject that already has triples
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Permission needed but no user given
    #[error("Authentication required")]
    AuthenticationRequired,

    /// User lacks the role
    #[error("Not allowed: {0}")]
    NotAllowed(String),

    /// Element change naming an unmapped field, or not fitting the field's kind
    #[error("Invalid change of {type_name}.{field}: {reason}")]
    InvalidChange {
        type_name: &'static str,
        field: String,
        reason: String,
    },

    /// Query parse or evaluation failure
    #[error("Query failed: {0}")]
    QueryFailed(#[from] QueryError),

    /// Triple store or durable storage failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid repository configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Declaration error or unrepresentable value
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),
}

pub type RepoResult<T> = Result<T, RepoError>;

impl RepoError {
    /// Whether the caller may act on the error (as opposed to infrastructure failures)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RepoError::NotFound(_)
                | RepoError::AlreadyExists(_)
                | RepoError::AuthenticationRequired
                | RepoError::NotAllowed(_)
                | RepoError::InvalidChange { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(RepoError::NotFound("x".into()).is_recoverable());
        assert!(RepoError::AuthenticationRequired.is_recoverable());
        assert!(RepoError::InvalidChange {
            type_name: "Collection",
            field: "tpyes".into(),
            reason: "not mapped".into(),
        }
        .is_recoverable());
        assert!(!RepoError::Mapping(MappingError::Cycle("Loop")).is_recoverable());
    }

    #[test]
    fn test_query_errors_convert() {
        let error: RepoError = QueryError::Unsupported("FILTER".into()).into();
        assert!(matches!(error, RepoError::QueryFailed(_)));
        assert!(!error.is_recoverable());
    }
}
