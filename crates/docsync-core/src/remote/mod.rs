//! Remote replica contract.
//!
//! The remote holds the same entity shape as the local store and stamps every
//! record with a revision marker (its own `updated_at`).

mod http;
mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{EntityId, EntityKind};
use crate::monitor::UserId;

pub use http::HttpRemote;
pub use memory::{InMemoryRemote, RemoteCall};

/// A record as stored by the remote replica
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    /// Remote-assigned identifier (the local entity's `cloud_id`)
    pub id: String,
    pub kind: EntityKind,
    /// Identifier of the entity in the local store
    pub local_id: EntityId,
    /// Revision marker: the remote's last-modified time (Unix ms)
    pub updated_at: i64,
    /// Entity fields in wire shape
    pub fields: Value,
}

/// Payload for creating a record that has never been uploaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDraft {
    pub kind: EntityKind,
    pub local_id: EntityId,
    pub fields: Value,
}

/// How the queue should react to a failed remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Transient: retry with backoff
    Retryable,
    /// Retrying cannot help: surface immediately
    Permanent,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Remote request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Remote replica is offline")]
    Offline,
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Remote record not found: {0}")]
    NotFound(String),
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("Remote API error: {0}")]
    Api(String),
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

impl RemoteError {
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::Offline => RetryClass::Retryable,
            Self::PermissionDenied(_)
            | Self::NotFound(_)
            | Self::InvalidCredentials(_)
            | Self::QuotaExceeded(_)
            | Self::InvalidPayload(_) => RetryClass::Permanent,
            Self::Api(message) => classify_message(message),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_class() == RetryClass::Retryable
    }
}

/// Classify a free-form error message from the remote.
///
/// Permanent markers win over transient ones; unknown messages are retried.
pub fn classify_message(message: &str) -> RetryClass {
    const PERMANENT: &[&str] = &[
        "permission-denied",
        "permission denied",
        "not-found",
        "not found",
        "invalid-credentials",
        "invalid credentials",
        "unauthorized",
        "quota-exceeded",
        "quota exceeded",
    ];

    let message = message.to_ascii_lowercase();
    if PERMANENT.iter().any(|marker| message.contains(marker)) {
        RetryClass::Permanent
    } else {
        RetryClass::Retryable
    }
}

/// Network-accessible replica of the entity store
#[async_trait]
pub trait RemoteReplica: Send + Sync {
    async fn create(&self, user: &UserId, draft: &RemoteDraft) -> RemoteResult<RemoteRecord>;

    async fn update_by_id(
        &self,
        user: &UserId,
        kind: EntityKind,
        remote_id: &str,
        fields: &Value,
    ) -> RemoteResult<RemoteRecord>;

    async fn get_by_id(
        &self,
        user: &UserId,
        kind: EntityKind,
        remote_id: &str,
    ) -> RemoteResult<Option<RemoteRecord>>;

    /// Records of `kind`, optionally only those revised after `updated_since`
    async fn list(
        &self,
        user: &UserId,
        kind: EntityKind,
        updated_since: Option<i64>,
    ) -> RemoteResult<Vec<RemoteRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(RemoteError::Network("reset".to_string()).is_retryable());
        assert!(RemoteError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(RemoteError::Offline.is_retryable());
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        assert!(!RemoteError::PermissionDenied("no".to_string()).is_retryable());
        assert!(!RemoteError::NotFound("doc".to_string()).is_retryable());
        assert!(!RemoteError::InvalidCredentials("bad".to_string()).is_retryable());
        assert!(!RemoteError::QuotaExceeded("full".to_string()).is_retryable());
    }

    #[test]
    fn api_messages_are_classified_by_keyword() {
        assert_eq!(
            classify_message("Firestore: permission-denied on /documents"),
            RetryClass::Permanent
        );
        assert_eq!(classify_message("Quota exceeded (429)"), RetryClass::Permanent);
        assert_eq!(classify_message("connection refused"), RetryClass::Retryable);
        assert_eq!(classify_message("internal error (500)"), RetryClass::Retryable);
    }
}
