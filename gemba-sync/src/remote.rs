//! External collaborators of the sync engine
//!
//! The engine never talks to the network directly; it goes through the
//! three traits below so tests can substitute in-memory fakes. `HttpRemote`
//! is the production implementation against a PostgREST-style remote store
//! with a storage API alongside it.

use crate::config::RemoteConfig;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The authenticated identity a sync pass runs under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
}

/// Session/identity lookup.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The current authenticated session, or `None` when nobody is signed
    /// in. A pass must not upload anything without a session.
    async fn current_session(&self) -> SyncResult<Option<Session>>;
}

/// Insert/lookup/delete against the remote relational store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Resolve the company scope a user's records must be attributed to.
    async fn company_for_user(&self, user_id: &str) -> SyncResult<Option<String>>;

    /// Insert one row, returning the remote-assigned id.
    async fn insert(&self, table: &str, record: serde_json::Value) -> SyncResult<String>;

    /// Look up a row by its client-generated temporary identifier.
    /// Idempotency probe: lets a retried pass reuse a header it already
    /// created instead of duplicating it.
    async fn find_by_temp_id(&self, table: &str, temp_id: &str) -> SyncResult<Option<String>>;

    /// Delete one row by remote id.
    async fn delete(&self, table: &str, id: &str) -> SyncResult<()>;
}

/// Blob upload for binary evidence.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Upload bytes under `bucket/filename`, returning the public URL.
    async fn upload(
        &self,
        bucket: &str,
        filename: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> SyncResult<String>;
}

/// HTTP client for the remote store, its auth endpoint and its storage API.
pub struct HttpRemote {
    client: reqwest::Client,
    config: RemoteConfig,
}

impl HttpRemote {
    /// Build the client with a per-request timeout so a dead network cannot
    /// hang a sync pass indefinitely.
    pub fn new(config: RemoteConfig) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| SyncError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.endpoint, table)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    /// Pull the `id` column out of a PostgREST row, tolerating both string
    /// and numeric ids.
    fn row_id(row: &serde_json::Value) -> Option<String> {
        match row.get("id")? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[async_trait]
impl SessionProvider for HttpRemote {
    async fn current_session(&self) -> SyncResult<Option<Session>> {
        let url = format!("{}/auth/v1/user", self.config.endpoint);
        let response = self.authed(self.client.get(&url)).send().await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(SyncError::Network(format!(
                "session lookup failed with status {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response.json().await?;
        Ok(body
            .get("id")
            .and_then(|id| id.as_str())
            .map(|id| Session {
                user_id: id.to_string(),
            }))
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn company_for_user(&self, user_id: &str) -> SyncResult<Option<String>> {
        let url = format!(
            "{}?user_id=eq.{}&select=company_id&limit=1",
            self.rest_url("company_users"),
            user_id
        );
        let response = self.authed(self.client.get(&url)).send().await?;

        if !response.status().is_success() {
            return Err(SyncError::Network(format!(
                "scope lookup failed with status {}",
                response.status()
            )));
        }

        let rows: Vec<serde_json::Value> = response.json().await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("company_id"))
            .and_then(|id| id.as_str())
            .map(str::to_string))
    }

    async fn insert(&self, table: &str, record: serde_json::Value) -> SyncResult<String> {
        let response = self
            .authed(self.client.post(self.rest_url(table)))
            .header("Prefer", "return=representation")
            .json(&record)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::RemoteInsert(format!(
                "{} into {}: {}",
                status, table, body
            )));
        }

        let rows: Vec<serde_json::Value> = response.json().await?;
        rows.first()
            .and_then(Self::row_id)
            .ok_or_else(|| SyncError::RemoteInsert(format!("{}: no id in response", table)))
    }

    async fn find_by_temp_id(&self, table: &str, temp_id: &str) -> SyncResult<Option<String>> {
        let url = format!(
            "{}?temp_id=eq.{}&select=id&limit=1",
            self.rest_url(table),
            temp_id
        );
        let response = self.authed(self.client.get(&url)).send().await?;

        if !response.status().is_success() {
            return Err(SyncError::Network(format!(
                "temp_id lookup failed with status {}",
                response.status()
            )));
        }

        let rows: Vec<serde_json::Value> = response.json().await?;
        Ok(rows.first().and_then(Self::row_id))
    }

    async fn delete(&self, table: &str, id: &str) -> SyncResult<()> {
        let url = format!("{}?id=eq.{}", self.rest_url(table), id);
        let response = self.authed(self.client.delete(&url)).send().await?;

        if !response.status().is_success() {
            return Err(SyncError::RemoteDelete(format!(
                "{} from {}: status {}",
                id,
                table,
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStorage for HttpRemote {
    async fn upload(
        &self,
        bucket: &str,
        filename: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> SyncResult<String> {
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.config.endpoint, bucket, filename
        );
        let response = self
            .authed(self.client.post(&url))
            .header("Content-Type", mime_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| SyncError::AttachmentUpload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SyncError::AttachmentUpload(format!(
                "{}: status {}",
                filename,
                response.status()
            )));
        }

        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.config.endpoint, bucket, filename
        ))
    }
}
