//! Error types for the sync engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("no authenticated session")]
    NoSession,

    #[error("no company scope resolvable for user {0}")]
    ScopeNotFound(String),

    #[error("remote insert failed: {0}")]
    RemoteInsert(String),

    #[error("remote delete failed: {0}")]
    RemoteDelete(String),

    #[error("attachment upload failed: {0}")]
    AttachmentUpload(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("local store error: {0}")]
    Store(#[from] gemba_store::StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
