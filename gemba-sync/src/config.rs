//! Remote endpoint configuration
//!
//! The endpoint, API key and storage bucket are opaque deployment values;
//! they are read from the environment (with `.env` support) and never
//! hardcoded past this module.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};

/// Connection settings for the remote store and its blob storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote store (PostgREST-style REST + storage API).
    pub endpoint: String,
    /// API key sent with every request.
    pub api_key: String,
    /// Bucket evidence images are uploaded into.
    pub bucket: String,
}

impl RemoteConfig {
    /// Load the remote configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] when `GEMBA_REMOTE_KEY` is unset; a
    /// missing key would only surface later as an opaque 401 on the first
    /// sync pass.
    pub fn from_env() -> SyncResult<Self> {
        dotenvy::dotenv().ok();

        let endpoint = std::env::var("GEMBA_REMOTE_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());
        let api_key = std::env::var("GEMBA_REMOTE_KEY")
            .map_err(|_| SyncError::Config("GEMBA_REMOTE_KEY is not set".to_string()))?;
        let bucket = std::env::var("GEMBA_STORAGE_BUCKET")
            .unwrap_or_else(|_| "evidencias".to_string());

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            bucket,
        })
    }
}
