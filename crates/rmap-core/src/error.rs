//! Error taxonomy for rmap-core.
//!
//! Resolution itself never fails: every collaborator error is downgraded to a
//! miss. These types cover construction-time problems and the per-fetch
//! failures strategies observe before downgrading them.

use std::time::Duration;

use rmap_state::StorageError;

/// Errors raised while configuring or building a resolver.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("invalid resolver config: {0}")]
    InvalidConfig(String),

    #[error("resolver is missing the {0} collaborator")]
    MissingCollaborator(&'static str),
}

/// Why a single bounded fetch did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl FetchError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FetchError::Storage(StorageError::Unauthorized { .. }))
    }
}

/// Result type for resolver construction.
pub type Result<T> = std::result::Result<T, ResolverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_includes_limit() {
        let err = FetchError::Timeout(Duration::from_millis(1500));
        assert!(err.to_string().contains("1.5s"));
    }

    #[test]
    fn unauthorized_is_detected_through_storage_error() {
        let err: FetchError = StorageError::Unauthorized {
            pid: "p".to_string(),
        }
        .into();
        assert!(err.is_unauthorized());
        assert!(!FetchError::Timeout(Duration::from_secs(1)).is_unauthorized());
    }

    #[test]
    fn missing_collaborator_display() {
        let err = ResolverError::MissingCollaborator("index");
        assert_eq!(err.to_string(), "resolver is missing the index collaborator");
    }
}
