//! Error types for docsync-core

use thiserror::Error;

use crate::config::ConfigError;
use crate::remote::RemoteError;

/// Result type alias using docsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in docsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local store error
    #[error("Store error: {0}")]
    Store(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid sync settings
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Remote replica error
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// No authenticated user is available for a sync operation
    #[error("Sync requires an authenticated user")]
    NotAuthenticated,

    /// Network is unavailable
    #[error("Network is offline")]
    Offline,
}

impl Error {
    /// Whether retrying the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote(error) => error.is_retryable(),
            Self::Offline => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_keep_their_classification() {
        let transient = Error::from(RemoteError::Network("connection reset".to_string()));
        assert!(transient.is_retryable());

        let denied = Error::from(RemoteError::PermissionDenied("read-only".to_string()));
        assert!(!denied.is_retryable());
    }

    #[test]
    fn local_errors_are_not_retryable() {
        assert!(!Error::NotFound("doc-1".to_string()).is_retryable());
        assert!(!Error::NotAuthenticated.is_retryable());
        assert!(Error::Offline.is_retryable());
    }
}
