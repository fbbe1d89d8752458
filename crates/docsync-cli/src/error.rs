use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] docsync_core::Error),
    #[error(transparent)]
    Remote(#[from] docsync_core::remote::RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No document title provided")]
    EmptyTitle,
    #[error("Edited content cannot be empty")]
    EmptyEditedContent,
    #[error("Document ID cannot be empty")]
    EmptyDocumentId,
    #[error("Document not found for id/prefix: {0}")]
    DocumentNotFound(String),
    #[error("{0}")]
    AmbiguousDocumentId(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Invalid conflict choice: {0}")]
    InvalidChoice(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Sync is not configured. Set DOCSYNC_REMOTE_URL and DOCSYNC_USER_ID (or pass --remote-url and --user) to enable `docsync sync`."
    )]
    SyncNotConfigured,
}
