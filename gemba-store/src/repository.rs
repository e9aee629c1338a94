//! Pending-write repository
//!
//! The only writer of the local store on behalf of capture forms. Enforces
//! the cross-collection invariants the store itself does not know about:
//! parent+children writes happen in one transaction, deletes cascade
//! explicitly, and a half-written record is never observable.

use crate::error::{StoreError, StoreResult};
use crate::local_db::{self, LocalStore};
use crate::models::{
    CardPatch, NewAudit, NewAuditEntry, NewCard, NewCardImage, OrphanSweep, PendingAudit,
    PendingAuditEntry, PendingCard, PendingCardImage, PendingCounts, RecordStatus,
    MAX_ENTRY_SCORE,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub struct PendingRepository {
    db: Arc<LocalStore>,
}

impl PendingRepository {
    pub fn new(db: Arc<LocalStore>) -> Self {
        Self { db }
    }

    /// Capture a card together with its evidence images.
    ///
    /// The card and every image are written in one transaction; a failing
    /// image rolls the whole capture back and surfaces as
    /// [`StoreError::PartialWrite`] so the form can ask the user to retry.
    pub async fn create_card(
        &self,
        card: NewCard,
        images: Vec<NewCardImage>,
    ) -> StoreResult<i64> {
        let now = Utc::now();
        let mut tx = self.db.pool().begin().await?;

        let card_id = local_db::insert_card(&mut *tx, &card, now).await?;

        for image in &images {
            let inserted = match validate_image(image) {
                Ok(()) => local_db::insert_card_image(&mut *tx, card_id, image, now).await,
                Err(e) => Err(e),
            };
            if let Err(e) = inserted {
                tx.rollback().await?;
                tracing::warn!(error = %e, "card capture rolled back");
                return Err(StoreError::PartialWrite(e.to_string()));
            }
        }

        tx.commit().await?;
        tracing::debug!(card_id, images = images.len(), "card captured locally");
        Ok(card_id)
    }

    /// Edit a draft card. When `new_images` is given the existing image set
    /// is replaced wholesale (no diffing). Always re-marks the record
    /// `pending_sync` with a clean attempt counter, so an edit is also the
    /// way out of the dead-letter state.
    pub async fn update_card(
        &self,
        id: i64,
        patch: CardPatch,
        new_images: Option<Vec<NewCardImage>>,
    ) -> StoreResult<()> {
        let now = Utc::now();
        let mut tx = self.db.pool().begin().await?;

        let mut card = local_db::get_card(&mut *tx, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("card {}", id)))?;

        if let Some(area) = patch.area {
            card.area = area;
        }
        if let Some(description) = patch.description {
            card.description = description;
        }
        if let Some(action) = patch.action {
            card.action = action;
        }
        if let Some(priority) = patch.priority {
            card.priority = priority;
        }
        if let Some(category) = patch.category {
            card.category = category;
        }
        if let Some(due_date) = patch.due_date {
            card.due_date = Some(due_date);
        }

        local_db::update_card_row(&mut *tx, &card).await?;

        if let Some(images) = &new_images {
            local_db::delete_images_for_card(&mut *tx, id).await?;
            for image in images {
                let inserted = match validate_image(image) {
                    Ok(()) => local_db::insert_card_image(&mut *tx, id, image, now).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = inserted {
                    tx.rollback().await?;
                    tracing::warn!(card_id = id, error = %e, "card update rolled back");
                    return Err(StoreError::PartialWrite(e.to_string()));
                }
            }
        }

        tx.commit().await?;
        tracing::debug!(card_id = id, replaced_images = new_images.is_some(), "card updated");
        Ok(())
    }

    /// Delete a card and all of its images. Cascade is explicit: both
    /// deletes run in one transaction so no orphaned blobs survive.
    pub async fn delete_card(&self, id: i64) -> StoreResult<()> {
        let mut tx = self.db.pool().begin().await?;

        local_db::delete_images_for_card(&mut *tx, id).await?;
        let deleted = local_db::delete_card_row(&mut *tx, id).await?;
        if deleted == 0 {
            tx.rollback().await?;
            return Err(StoreError::NotFound(format!("card {}", id)));
        }

        tx.commit().await?;
        tracing::debug!(card_id = id, "card deleted");
        Ok(())
    }

    /// Capture an audit header together with all of its entries.
    ///
    /// The stored `total_score` is the mean of the entry scores at this
    /// moment; it is a denormalized snapshot, never recomputed later.
    pub async fn create_audit(
        &self,
        audit: NewAudit,
        entries: Vec<NewAuditEntry>,
    ) -> StoreResult<i64> {
        if entries.is_empty() {
            return Err(StoreError::InvalidRecord(
                "audit requires at least one entry".to_string(),
            ));
        }

        let total_score =
            entries.iter().map(|e| e.score as f64).sum::<f64>() / entries.len() as f64;
        let temp_id = format!(
            "audit_{}_{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        );
        let now = Utc::now();

        let mut tx = self.db.pool().begin().await?;
        let audit_id =
            local_db::insert_audit(&mut *tx, &audit, &temp_id, total_score, now).await?;

        for entry in &entries {
            let inserted = match validate_entry(entry) {
                Ok(()) => local_db::insert_audit_entry(&mut *tx, audit_id, entry).await,
                Err(e) => Err(e),
            };
            if let Err(e) = inserted {
                tx.rollback().await?;
                tracing::warn!(error = %e, "audit capture rolled back");
                return Err(StoreError::PartialWrite(e.to_string()));
            }
        }

        tx.commit().await?;
        tracing::debug!(audit_id, entries = entries.len(), total_score, "audit captured locally");
        Ok(audit_id)
    }

    /// Delete an audit and all of its entries.
    pub async fn delete_audit(&self, id: i64) -> StoreResult<()> {
        let mut tx = self.db.pool().begin().await?;

        local_db::delete_entries_for_audit(&mut *tx, id).await?;
        let deleted = local_db::delete_audit_row(&mut *tx, id).await?;
        if deleted == 0 {
            tx.rollback().await?;
            return Err(StoreError::NotFound(format!("audit {}", id)));
        }

        tx.commit().await?;
        tracing::debug!(audit_id = id, "audit deleted");
        Ok(())
    }

    pub async fn get_card(&self, id: i64) -> StoreResult<Option<PendingCard>> {
        local_db::get_card(self.db.pool(), id).await
    }

    pub async fn get_audit(&self, id: i64) -> StoreResult<Option<PendingAudit>> {
        local_db::get_audit(self.db.pool(), id).await
    }

    pub async fn audit_by_temp_id(&self, temp_id: &str) -> StoreResult<Option<PendingAudit>> {
        local_db::audit_by_temp_id(self.db.pool(), temp_id).await
    }

    /// Cards awaiting sync, oldest first.
    pub async fn list_pending_cards(&self) -> StoreResult<Vec<PendingCard>> {
        local_db::cards_with_status(self.db.pool(), RecordStatus::PendingSync).await
    }

    /// Audits awaiting sync, oldest first.
    pub async fn list_pending_audits(&self) -> StoreResult<Vec<PendingAudit>> {
        local_db::audits_with_status(self.db.pool(), RecordStatus::PendingSync).await
    }

    /// Dead-lettered cards: out of the sync rotation until edited.
    pub async fn list_blocked_cards(&self) -> StoreResult<Vec<PendingCard>> {
        local_db::cards_with_status(self.db.pool(), RecordStatus::SyncBlocked).await
    }

    pub async fn list_blocked_audits(&self) -> StoreResult<Vec<PendingAudit>> {
        local_db::audits_with_status(self.db.pool(), RecordStatus::SyncBlocked).await
    }

    pub async fn list_cards_for_company(&self, company_id: &str) -> StoreResult<Vec<PendingCard>> {
        local_db::cards_for_company(self.db.pool(), company_id).await
    }

    pub async fn images_for_card(&self, card_id: i64) -> StoreResult<Vec<PendingCardImage>> {
        local_db::images_for_card(self.db.pool(), card_id).await
    }

    pub async fn entries_for_audit(&self, audit_id: i64) -> StoreResult<Vec<PendingAuditEntry>> {
        local_db::entries_for_audit(self.db.pool(), audit_id).await
    }

    pub async fn pending_counts(&self) -> StoreResult<PendingCounts> {
        Ok(PendingCounts {
            cards: local_db::count_cards_with_status(self.db.pool(), RecordStatus::PendingSync)
                .await?,
            audits: local_db::count_audits_with_status(self.db.pool(), RecordStatus::PendingSync)
                .await?,
        })
    }

    pub async fn blocked_counts(&self) -> StoreResult<PendingCounts> {
        Ok(PendingCounts {
            cards: local_db::count_cards_with_status(self.db.pool(), RecordStatus::SyncBlocked)
                .await?,
            audits: local_db::count_audits_with_status(self.db.pool(), RecordStatus::SyncBlocked)
                .await?,
        })
    }

    /// Record a failed sync pass for a card; flips it to `sync_blocked`
    /// once `max_attempts` is reached.
    pub async fn mark_card_sync_failed(
        &self,
        id: i64,
        error: &str,
        max_attempts: i64,
    ) -> StoreResult<()> {
        local_db::mark_card_failed(self.db.pool(), id, error, max_attempts).await?;
        tracing::warn!(card_id = id, error, "card sync failed, kept locally");
        Ok(())
    }

    pub async fn mark_audit_sync_failed(
        &self,
        id: i64,
        error: &str,
        max_attempts: i64,
    ) -> StoreResult<()> {
        local_db::mark_audit_failed(self.db.pool(), id, error, max_attempts).await?;
        tracing::warn!(audit_id = id, error, "audit sync failed, kept locally");
        Ok(())
    }

    /// Idempotent cleanup of children whose parent no longer resolves.
    ///
    /// Transactional cascade means orphans cannot be produced by this build;
    /// the sweep exists for databases written by older builds or interrupted
    /// mid-delete before cascade became transactional.
    pub async fn collect_orphans(&self) -> StoreResult<OrphanSweep> {
        let sweep = OrphanSweep {
            images_deleted: local_db::delete_orphan_images(self.db.pool()).await?,
            entries_deleted: local_db::delete_orphan_entries(self.db.pool()).await?,
        };
        if sweep.images_deleted > 0 || sweep.entries_deleted > 0 {
            tracing::info!(
                images = sweep.images_deleted,
                entries = sweep.entries_deleted,
                "orphaned child records removed"
            );
        }
        Ok(sweep)
    }
}

fn validate_image(image: &NewCardImage) -> StoreResult<()> {
    if image.data.is_empty() {
        return Err(StoreError::InvalidRecord("image has no bytes".to_string()));
    }
    if image.mime_type.is_empty() {
        return Err(StoreError::InvalidRecord("image has no mime type".to_string()));
    }
    Ok(())
}

fn validate_entry(entry: &NewAuditEntry) -> StoreResult<()> {
    if !(0..=MAX_ENTRY_SCORE).contains(&entry.score) {
        return Err(StoreError::InvalidRecord(format!(
            "entry score {} outside 0..={}",
            entry.score, MAX_ENTRY_SCORE
        )));
    }
    Ok(())
}
