//! Sync engine
//!
//! Moves every pending record to the remote store exactly once, one pass at
//! a time. A pass authenticates, then works through cards and audits oldest
//! first, each record independently: evidence uploads, scope resolution,
//! remote insert, and only after confirmed remote success the local delete.
//! A record's failure never blocks the rest of the pass, and nothing is
//! retried within a pass; retries happen on the next pass until the attempt
//! ceiling dead-letters the record.

use crate::connectivity::ConnectivityMonitor;
use crate::error::SyncResult;
use crate::remote::{BlobStorage, RemoteStore, Session, SessionProvider};
use chrono::Utc;
use gemba_store::{PendingAudit, PendingCard, PendingRepository};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const CARDS_TABLE: &str = "tarjetas_rojas";
const AUDITS_TABLE: &str = "auditorias";
const AUDIT_ENTRIES_TABLE: &str = "auditoria_items";

/// Initial status a record carries remotely. Distinct from the local
/// pending-sync status: once remote, a finding is an open item in the
/// improvement workflow.
const REMOTE_STATUS_OPEN: &str = "Abierto";

/// Tunables for a sync pass.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Bucket evidence images are uploaded into.
    pub bucket: String,
    /// Failed passes a record gets before it is dead-lettered.
    pub max_attempts: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bucket: "evidencias".to_string(),
            max_attempts: 10,
        }
    }
}

/// What one sync pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Another pass held the lock; nothing was done.
    pub already_running: bool,
    /// No authenticated session; nothing was touched.
    pub aborted_no_session: bool,
    pub cards_synced: usize,
    pub cards_failed: usize,
    pub cards_skipped_no_scope: usize,
    pub audits_synced: usize,
    pub audits_failed: usize,
    pub audits_skipped_no_scope: usize,
    pub images_uploaded: usize,
    pub images_failed: usize,
}

enum RecordOutcome {
    Synced,
    SkippedNoScope,
    Failed,
}

/// Drives the upload/sync reconciliation protocol.
pub struct SyncEngine {
    repo: Arc<PendingRepository>,
    session: Arc<dyn SessionProvider>,
    remote: Arc<dyn RemoteStore>,
    blobs: Arc<dyn BlobStorage>,
    monitor: Arc<ConnectivityMonitor>,
    config: SyncConfig,
    pass_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        repo: Arc<PendingRepository>,
        session: Arc<dyn SessionProvider>,
        remote: Arc<dyn RemoteStore>,
        blobs: Arc<dyn BlobStorage>,
        monitor: Arc<ConnectivityMonitor>,
        config: SyncConfig,
    ) -> Self {
        Self {
            repo,
            session,
            remote,
            blobs,
            monitor,
            config,
            pass_lock: Mutex::new(()),
        }
    }

    /// Run one pass over everything currently pending.
    ///
    /// At most one pass runs at a time; a second invocation while one is in
    /// flight reports `already_running` and does no work. Per-record remote
    /// failures are absorbed into the report; only local-store failures
    /// propagate as errors.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`](crate::SyncError::Store) when the local
    /// database itself fails mid-pass.
    pub async fn sync_all(&self) -> SyncResult<SyncReport> {
        // The guard must drop on every exit path; a wedged flag would
        // permanently stop all future passes.
        let Ok(_guard) = self.pass_lock.try_lock() else {
            tracing::debug!("sync pass already in flight, skipping");
            return Ok(SyncReport {
                already_running: true,
                ..SyncReport::default()
            });
        };

        let mut report = SyncReport::default();

        let session = match self.session.current_session().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::info!("no authenticated session, sync postponed");
                report.aborted_no_session = true;
                return Ok(report);
            }
            Err(e) => {
                tracing::warn!(error = %e, "session lookup failed, sync postponed");
                report.aborted_no_session = true;
                return Ok(report);
            }
        };

        let cards = self.repo.list_pending_cards().await?;
        let audits = self.repo.list_pending_audits().await?;
        tracing::info!(
            cards = cards.len(),
            audits = audits.len(),
            user_id = %session.user_id,
            "sync pass started"
        );

        for card in &cards {
            match self.sync_card(&session, card, &mut report).await? {
                RecordOutcome::Synced => report.cards_synced += 1,
                RecordOutcome::SkippedNoScope => report.cards_skipped_no_scope += 1,
                RecordOutcome::Failed => report.cards_failed += 1,
            }
        }

        for audit in &audits {
            match self.sync_audit(&session, audit).await? {
                RecordOutcome::Synced => report.audits_synced += 1,
                RecordOutcome::SkippedNoScope => report.audits_skipped_no_scope += 1,
                RecordOutcome::Failed => report.audits_failed += 1,
            }
        }

        let counts = self.repo.pending_counts().await?;
        self.monitor.publish_counts(counts);

        tracing::info!(
            cards_synced = report.cards_synced,
            cards_failed = report.cards_failed,
            audits_synced = report.audits_synced,
            audits_failed = report.audits_failed,
            still_pending = counts.total(),
            "sync pass finished"
        );
        Ok(report)
    }

    async fn sync_card(
        &self,
        session: &Session,
        card: &PendingCard,
        report: &mut SyncReport,
    ) -> SyncResult<RecordOutcome> {
        let images = self.repo.images_for_card(card.id).await?;

        // A card may reach the remote store with zero, some or all of its
        // evidence attached; a failed upload is never fatal to the card.
        let mut image_urls = Vec::with_capacity(images.len());
        for image in &images {
            let filename = attachment_filename(&image.mime_type);
            match self
                .blobs
                .upload(&self.config.bucket, &filename, &image.data, &image.mime_type)
                .await
            {
                Ok(url) => {
                    report.images_uploaded += 1;
                    image_urls.push(url);
                }
                Err(e) => {
                    report.images_failed += 1;
                    tracing::warn!(
                        card_id = card.id,
                        image_id = image.id,
                        error = %e,
                        "attachment upload failed, syncing card without it"
                    );
                }
            }
        }

        let company_id = match self.remote.company_for_user(&session.user_id).await {
            Ok(Some(company_id)) => company_id,
            Ok(None) => {
                // Inserting with a guessed scope would break remote
                // referential integrity; the record stays pending instead.
                tracing::warn!(
                    card_id = card.id,
                    user_id = %session.user_id,
                    "no company scope for user, card kept pending"
                );
                return Ok(RecordOutcome::SkippedNoScope);
            }
            Err(e) => {
                self.repo
                    .mark_card_sync_failed(card.id, &e.to_string(), self.config.max_attempts)
                    .await?;
                return Ok(RecordOutcome::Failed);
            }
        };

        let payload = serde_json::json!({
            "area": card.area,
            "description": card.description,
            "action": card.action,
            "priority": card.priority.as_str(),
            "category": card.category.as_str(),
            "status": REMOTE_STATUS_OPEN,
            "company_id": company_id,
            "user_id": session.user_id,
            "due_date": card.due_date.map(|d| d.to_string()),
            "created_at": card.created_at.to_rfc3339(),
            "image_url": image_urls.first(),
            "image_urls": image_urls,
        });

        match self.remote.insert(CARDS_TABLE, payload).await {
            Ok(remote_id) => {
                // Confirmed remote; only now does the local draft go away.
                self.repo.delete_card(card.id).await?;
                tracing::info!(
                    card_id = card.id,
                    remote_id = %remote_id,
                    images = image_urls.len(),
                    "card synced"
                );
                Ok(RecordOutcome::Synced)
            }
            Err(e) => {
                self.repo
                    .mark_card_sync_failed(card.id, &e.to_string(), self.config.max_attempts)
                    .await?;
                Ok(RecordOutcome::Failed)
            }
        }
    }

    async fn sync_audit(
        &self,
        session: &Session,
        audit: &PendingAudit,
    ) -> SyncResult<RecordOutcome> {
        let entries = self.repo.entries_for_audit(audit.id).await?;

        let company_id = match self.remote.company_for_user(&session.user_id).await {
            Ok(Some(company_id)) => company_id,
            Ok(None) => {
                tracing::warn!(
                    audit_id = audit.id,
                    user_id = %session.user_id,
                    "no company scope for user, audit kept pending"
                );
                return Ok(RecordOutcome::SkippedNoScope);
            }
            Err(e) => {
                self.repo
                    .mark_audit_sync_failed(audit.id, &e.to_string(), self.config.max_attempts)
                    .await?;
                return Ok(RecordOutcome::Failed);
            }
        };

        // Header and entries cannot go remote in one transaction. The
        // client temp_id makes the header insert idempotent: a pass retried
        // after an entry failure finds the header instead of duplicating it.
        let header_id = match self.remote.find_by_temp_id(AUDITS_TABLE, &audit.temp_id).await {
            Ok(Some(existing)) => {
                tracing::info!(
                    audit_id = audit.id,
                    remote_id = %existing,
                    "reusing audit header from an earlier pass"
                );
                existing
            }
            Ok(None) => {
                let header = serde_json::json!({
                    "temp_id": audit.temp_id,
                    "title": audit.title,
                    "area": audit.area,
                    "auditor": audit.auditor,
                    "audit_date": audit.audit_date.to_string(),
                    "total_score": audit.total_score,
                    "company_id": company_id,
                    "user_id": session.user_id,
                    "created_at": audit.created_at.to_rfc3339(),
                });
                match self.remote.insert(AUDITS_TABLE, header).await {
                    Ok(id) => id,
                    Err(e) => {
                        self.repo
                            .mark_audit_sync_failed(
                                audit.id,
                                &e.to_string(),
                                self.config.max_attempts,
                            )
                            .await?;
                        return Ok(RecordOutcome::Failed);
                    }
                }
            }
            Err(e) => {
                self.repo
                    .mark_audit_sync_failed(audit.id, &e.to_string(), self.config.max_attempts)
                    .await?;
                return Ok(RecordOutcome::Failed);
            }
        };

        for entry in &entries {
            let payload = serde_json::json!({
                "audit_id": header_id,
                "section": entry.section.as_str(),
                "question": entry.question,
                "score": entry.score,
                "comment": entry.comment,
            });
            if let Err(e) = self.remote.insert(AUDIT_ENTRIES_TABLE, payload).await {
                // Header exists remotely, local draft stays; the next pass
                // reuses the header via temp_id.
                self.repo
                    .mark_audit_sync_failed(audit.id, &e.to_string(), self.config.max_attempts)
                    .await?;
                tracing::warn!(
                    audit_id = audit.id,
                    remote_id = %header_id,
                    error = %e,
                    "entry insert failed, audit kept pending"
                );
                return Ok(RecordOutcome::Failed);
            }
        }

        self.repo.delete_audit(audit.id).await?;
        tracing::info!(
            audit_id = audit.id,
            remote_id = %header_id,
            entries = entries.len(),
            "audit synced"
        );
        Ok(RecordOutcome::Synced)
    }
}

/// Collision-resistant remote filename: capture moment plus a random
/// component, so devices uploading at the same millisecond cannot clash.
fn attachment_filename(mime_type: &str) -> String {
    let ext = match mime_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    };
    format!(
        "card_{}_{}.{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        ext
    )
}
