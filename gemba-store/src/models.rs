//! Record types for the four pending collections
//!
//! Everything here is local-only: records live in these shapes until a sync
//! pass moves them to the remote store and deletes the local copy. Local ids
//! are assigned by SQLite and never reach the remote side.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Company/user value stored when the capturing device has no resolved
/// identity yet. Never sent to the remote store; the sync engine re-resolves
/// the real scope from the session at upload time.
pub const OFFLINE_PLACEHOLDER: &str = "offline";

/// Entry scores are bounded to the 5S scoring scale.
pub const MAX_ENTRY_SCORE: i64 = 5;

/// Priority of a red-tag finding. Wire labels keep the app's user-facing
/// Spanish values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "Baja")]
    Low,
    #[serde(rename = "Media")]
    Medium,
    #[serde(rename = "Alta")]
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Baja",
            Priority::Medium => "Media",
            Priority::High => "Alta",
        }
    }

    pub fn from_str(s: &str) -> StoreResult<Self> {
        match s {
            "Baja" => Ok(Priority::Low),
            "Media" => Ok(Priority::Medium),
            "Alta" => Ok(Priority::High),
            _ => Err(StoreError::InvalidRecord(format!("unknown priority: {}", s))),
        }
    }
}

/// The seven fixed categories a finding can be tagged with: the five 5S
/// pillars plus safety and a catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardCategory {
    Seiri,
    Seiton,
    Seiso,
    Seiketsu,
    Shitsuke,
    Seguridad,
    Otro,
}

impl CardCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardCategory::Seiri => "Seiri",
            CardCategory::Seiton => "Seiton",
            CardCategory::Seiso => "Seiso",
            CardCategory::Seiketsu => "Seiketsu",
            CardCategory::Shitsuke => "Shitsuke",
            CardCategory::Seguridad => "Seguridad",
            CardCategory::Otro => "Otro",
        }
    }

    pub fn from_str(s: &str) -> StoreResult<Self> {
        match s {
            "Seiri" => Ok(CardCategory::Seiri),
            "Seiton" => Ok(CardCategory::Seiton),
            "Seiso" => Ok(CardCategory::Seiso),
            "Seiketsu" => Ok(CardCategory::Seiketsu),
            "Shitsuke" => Ok(CardCategory::Shitsuke),
            "Seguridad" => Ok(CardCategory::Seguridad),
            "Otro" => Ok(CardCategory::Otro),
            _ => Err(StoreError::InvalidRecord(format!("unknown category: {}", s))),
        }
    }
}

/// The five audit sections, one per 5S pillar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSection {
    Seiri,
    Seiton,
    Seiso,
    Seiketsu,
    Shitsuke,
}

impl AuditSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSection::Seiri => "seiri",
            AuditSection::Seiton => "seiton",
            AuditSection::Seiso => "seiso",
            AuditSection::Seiketsu => "seiketsu",
            AuditSection::Shitsuke => "shitsuke",
        }
    }

    pub fn from_str(s: &str) -> StoreResult<Self> {
        match s {
            "seiri" => Ok(AuditSection::Seiri),
            "seiton" => Ok(AuditSection::Seiton),
            "seiso" => Ok(AuditSection::Seiso),
            "seiketsu" => Ok(AuditSection::Seiketsu),
            "shitsuke" => Ok(AuditSection::Shitsuke),
            _ => Err(StoreError::InvalidRecord(format!("unknown audit section: {}", s))),
        }
    }
}

/// Local lifecycle status of a pending record.
///
/// `PendingSync` is the live state; `SyncBlocked` is the dead-letter state a
/// record enters after exhausting its sync attempts. Blocked records stop
/// being selected by sync passes and leave the pending count, but stay
/// visible through the blocked listings until a user edits or deletes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    PendingSync,
    SyncBlocked,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::PendingSync => "pending_sync",
            RecordStatus::SyncBlocked => "sync_blocked",
        }
    }

    pub fn from_str(s: &str) -> StoreResult<Self> {
        match s {
            "pending_sync" => Ok(RecordStatus::PendingSync),
            "sync_blocked" => Ok(RecordStatus::SyncBlocked),
            _ => Err(StoreError::InvalidRecord(format!("unknown status: {}", s))),
        }
    }
}

/// Before/after marker on an evidence image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageTag {
    Before,
    After,
}

impl ImageTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageTag::Before => "before",
            ImageTag::After => "after",
        }
    }

    pub fn from_str(s: &str) -> StoreResult<Self> {
        match s {
            "before" => Ok(ImageTag::Before),
            "after" => Ok(ImageTag::After),
            _ => Err(StoreError::InvalidRecord(format!("unknown image tag: {}", s))),
        }
    }
}

/// One unsynced red-tag finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCard {
    pub id: i64,
    pub area: String,
    pub description: String,
    /// Findings / suggested corrective action.
    pub action: String,
    pub priority: Priority,
    pub category: CardCategory,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub company_id: String,
    pub user_id: String,
    pub due_date: Option<NaiveDate>,
    /// Failed sync passes so far.
    pub sync_attempts: i64,
    pub last_sync_error: Option<String>,
}

/// Capture-form input for a new card. Missing identity fields fall back to
/// [`OFFLINE_PLACEHOLDER`].
#[derive(Debug, Clone)]
pub struct NewCard {
    pub area: String,
    pub description: String,
    pub action: String,
    pub priority: Priority,
    pub category: CardCategory,
    pub company_id: Option<String>,
    pub user_id: Option<String>,
    pub due_date: Option<NaiveDate>,
}

/// Partial update for an existing card; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct CardPatch {
    pub area: Option<String>,
    pub description: Option<String>,
    pub action: Option<String>,
    pub priority: Option<Priority>,
    pub category: Option<CardCategory>,
    pub due_date: Option<NaiveDate>,
}

/// A binary evidence attachment owned by exactly one pending card.
#[derive(Debug, Clone)]
pub struct PendingCardImage {
    pub id: i64,
    pub card_id: i64,
    pub data: Vec<u8>,
    pub mime_type: String,
    pub captured_at: DateTime<Utc>,
    pub tag: Option<ImageTag>,
}

#[derive(Debug, Clone)]
pub struct NewCardImage {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub tag: Option<ImageTag>,
}

/// One unsynced 5S audit header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAudit {
    pub id: i64,
    /// Client-generated identifier, stable across sync retries. Used as the
    /// idempotency key when the remote header insert must be retried.
    pub temp_id: String,
    pub title: String,
    pub area: String,
    pub auditor: String,
    pub audit_date: NaiveDate,
    /// Mean of all entry scores, snapshotted at creation.
    pub total_score: f64,
    pub company_id: String,
    pub user_id: String,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub sync_attempts: i64,
    pub last_sync_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAudit {
    pub title: String,
    pub area: String,
    pub auditor: String,
    pub audit_date: NaiveDate,
    pub company_id: Option<String>,
    pub user_id: Option<String>,
}

/// One answered question within an audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAuditEntry {
    pub id: i64,
    pub audit_id: i64,
    pub section: AuditSection,
    pub question: String,
    pub score: i64,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub section: AuditSection,
    pub question: String,
    pub score: i64,
    pub comment: Option<String>,
}

/// Live pending-record counts, republished to the UI by the connectivity
/// monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub cards: i64,
    pub audits: i64,
}

impl PendingCounts {
    pub fn total(&self) -> i64 {
        self.cards + self.audits
    }
}

/// Result of an orphan-cleanup sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrphanSweep {
    pub images_deleted: u64,
    pub entries_deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_labels_round_trip() {
        for p in [Priority::Low, Priority::Medium, Priority::High] {
            assert_eq!(Priority::from_str(p.as_str()).unwrap(), p);
        }
        assert_eq!(Priority::High.as_str(), "Alta");
        assert!(Priority::from_str("urgent").is_err());
    }

    #[test]
    fn card_categories_are_seven() {
        let all = [
            CardCategory::Seiri,
            CardCategory::Seiton,
            CardCategory::Seiso,
            CardCategory::Seiketsu,
            CardCategory::Shitsuke,
            CardCategory::Seguridad,
            CardCategory::Otro,
        ];
        assert_eq!(all.len(), 7);
        for c in all {
            assert_eq!(CardCategory::from_str(c.as_str()).unwrap(), c);
        }
    }

    #[test]
    fn audit_sections_are_five() {
        let all = [
            AuditSection::Seiri,
            AuditSection::Seiton,
            AuditSection::Seiso,
            AuditSection::Seiketsu,
            AuditSection::Shitsuke,
        ];
        assert_eq!(all.len(), 5);
        for s in all {
            assert_eq!(AuditSection::from_str(s.as_str()).unwrap(), s);
        }
    }

    #[test]
    fn status_labels() {
        assert_eq!(RecordStatus::PendingSync.as_str(), "pending_sync");
        assert_eq!(
            RecordStatus::from_str("sync_blocked").unwrap(),
            RecordStatus::SyncBlocked
        );
        assert!(RecordStatus::from_str("synced").is_err());
    }
}
