//! Durable local store for offline shop-floor captures
//!
//! Provides:
//! - SQLite persistence of pending 5S cards, evidence images, audits and
//!   audit entries, surviving process restarts
//! - Forward-only schema migrations via `PRAGMA user_version`
//! - A pending-write repository enforcing the cross-collection invariants
//!   (transactional cascade, bulk-entry atomicity) the store itself does
//!   not know about

pub mod error;
pub mod local_db;
pub mod models;
pub mod repository;

pub use error::{StoreError, StoreResult};
pub use local_db::{LocalStore, LocalStoreConfig, SCHEMA_VERSION};
pub use models::{
    AuditSection, CardCategory, CardPatch, ImageTag, NewAudit, NewAuditEntry, NewCard,
    NewCardImage, OrphanSweep, PendingAudit, PendingAuditEntry, PendingCard, PendingCardImage,
    PendingCounts, Priority, RecordStatus, MAX_ENTRY_SCORE, OFFLINE_PLACEHOLDER,
};
pub use repository::PendingRepository;
