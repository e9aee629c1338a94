//! Error types for the local store

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("local storage unavailable: {0}")]
    Unavailable(String),

    #[error("database is at schema version {found}, this build supports up to {supported}")]
    SchemaDowngrade { found: i64, supported: i64 },

    #[error("partial write rolled back: {0}")]
    PartialWrite(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
