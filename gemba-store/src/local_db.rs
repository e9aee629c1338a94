//! Local SQLite database for offline-first capture
//!
//! Provides:
//! - Durable persistence of the four pending collections
//! - Schema versioning with forward-only, non-destructive migrations
//! - Row primitives shared between pooled calls and repository transactions
//!
//! The store knows nothing about cross-collection invariants (cascade
//! deletes, bulk-entry atomicity); those live in the repository, which is
//! the only writer on behalf of capture forms.

use crate::error::{StoreError, StoreResult};
use crate::models::{
    AuditSection, CardCategory, ImageTag, NewAudit, NewAuditEntry, NewCard, NewCardImage,
    PendingAudit, PendingAuditEntry, PendingCard, PendingCardImage, Priority, RecordStatus,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Executor, Row, Sqlite};

/// Current local schema version, tracked through `PRAGMA user_version`.
/// v1: initial four-collection schema. v2: sync attempt accounting columns.
pub const SCHEMA_VERSION: i64 = 2;

/// Configuration for the local database file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStoreConfig {
    /// Path to the database file.
    pub db_path: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Whether to enable WAL mode.
    pub enable_wal: bool,
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            db_path: "gemba_local.db".to_string(),
            max_connections: 5,
            enable_wal: true,
        }
    }
}

/// Handle to the local database.
pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    /// Open (creating if absent) the local database and bring its schema to
    /// the current version.
    ///
    /// Fails with [`StoreError::Unavailable`] when the host cannot provide
    /// persistent storage at the configured path, and with
    /// [`StoreError::SchemaDowngrade`] when the file was written by a newer
    /// build.
    pub async fn open(config: LocalStoreConfig) -> StoreResult<Self> {
        let mut options = SqliteConnectOptions::new()
            .filename(&config.db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            // Writes must be durable before the call returns; capture
            // happens on the shop floor where power loss is routine.
            .synchronous(SqliteSynchronous::Full);
        if config.enable_wal {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::info!(db_path = %config.db_path, "local store opened");
        Ok(store)
    }

    /// Current `PRAGMA user_version` of the open file.
    pub async fn schema_version(&self) -> StoreResult<i64> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }

    async fn set_schema_version(&self, version: i64) -> StoreResult<()> {
        // PRAGMA does not accept bind parameters.
        sqlx::query(&format!("PRAGMA user_version = {}", version))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn migrate(&self) -> StoreResult<()> {
        let current = self.schema_version().await?;
        if current > SCHEMA_VERSION {
            return Err(StoreError::SchemaDowngrade {
                found: current,
                supported: SCHEMA_VERSION,
            });
        }
        if current == SCHEMA_VERSION {
            return Ok(());
        }

        if current == 0 {
            self.create_schema().await?;
        } else if current < 2 {
            tracing::info!(from = current, to = SCHEMA_VERSION, "migrating local schema");
            self.migrate_v1_to_v2().await?;
        }

        self.set_schema_version(SCHEMA_VERSION).await?;
        Ok(())
    }

    async fn create_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_cards (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                area TEXT NOT NULL,
                description TEXT NOT NULL,
                action TEXT NOT NULL,
                priority TEXT NOT NULL,
                category TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending_sync',
                created_at TEXT NOT NULL,
                company_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                due_date TEXT,
                sync_attempts INTEGER NOT NULL DEFAULT 0,
                last_sync_error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_pending_cards_status ON pending_cards(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pending_cards_company ON pending_cards(company_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_pending_cards_user ON pending_cards(user_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_card_images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                card_id INTEGER NOT NULL,
                data BLOB NOT NULL,
                mime_type TEXT NOT NULL,
                captured_at TEXT NOT NULL,
                tag TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pending_card_images_card ON pending_card_images(card_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_audits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                temp_id TEXT NOT NULL,
                title TEXT NOT NULL,
                area TEXT NOT NULL,
                auditor TEXT NOT NULL,
                audit_date TEXT NOT NULL,
                total_score REAL NOT NULL,
                company_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending_sync',
                created_at TEXT NOT NULL,
                sync_attempts INTEGER NOT NULL DEFAULT 0,
                last_sync_error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pending_audits_status ON pending_audits(status)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pending_audits_company ON pending_audits(company_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_pending_audits_user ON pending_audits(user_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pending_audits_temp ON pending_audits(temp_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_audit_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                audit_id INTEGER NOT NULL,
                section TEXT NOT NULL,
                question TEXT NOT NULL,
                score INTEGER NOT NULL,
                comment TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pending_audit_entries_audit ON pending_audit_entries(audit_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// v1 predates sync attempt accounting; existing rows keep their data
    /// and start with a clean attempt counter.
    async fn migrate_v1_to_v2(&self) -> StoreResult<()> {
        for statement in [
            "ALTER TABLE pending_cards ADD COLUMN sync_attempts INTEGER NOT NULL DEFAULT 0",
            "ALTER TABLE pending_cards ADD COLUMN last_sync_error TEXT",
            "ALTER TABLE pending_audits ADD COLUMN sync_attempts INTEGER NOT NULL DEFAULT 0",
            "ALTER TABLE pending_audits ADD COLUMN last_sync_error TEXT",
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Get the database pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Vacuum the database to reclaim space after bulk deletions (synced
    /// records carry image blobs, so drained queues leave large free pages).
    pub async fn vacuum(&self) -> StoreResult<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the database connection.
    pub async fn close(self) -> StoreResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

// Row primitives. Executor-generic so the repository can run the same
// statement against the pool or inside a transaction.

pub(crate) async fn insert_card<'e, E>(
    exec: E,
    card: &NewCard,
    created_at: DateTime<Utc>,
) -> StoreResult<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO pending_cards (
            area, description, action, priority, category, status,
            created_at, company_id, user_id, due_date
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&card.area)
    .bind(&card.description)
    .bind(&card.action)
    .bind(card.priority.as_str())
    .bind(card.category.as_str())
    .bind(RecordStatus::PendingSync.as_str())
    .bind(created_at.to_rfc3339())
    .bind(card.company_id.as_deref().unwrap_or(crate::models::OFFLINE_PLACEHOLDER))
    .bind(card.user_id.as_deref().unwrap_or(crate::models::OFFLINE_PLACEHOLDER))
    .bind(card.due_date.map(|d| d.to_string()))
    .execute(exec)
    .await?;

    Ok(result.last_insert_rowid())
}

pub(crate) async fn insert_card_image<'e, E>(
    exec: E,
    card_id: i64,
    image: &NewCardImage,
    captured_at: DateTime<Utc>,
) -> StoreResult<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO pending_card_images (card_id, data, mime_type, captured_at, tag)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(card_id)
    .bind(&image.data)
    .bind(&image.mime_type)
    .bind(captured_at.to_rfc3339())
    .bind(image.tag.map(|t| t.as_str()))
    .execute(exec)
    .await?;

    Ok(result.last_insert_rowid())
}

pub(crate) async fn get_card<'e, E>(exec: E, id: i64) -> StoreResult<Option<PendingCard>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM pending_cards WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(card_from_row).transpose()
}

/// Full-row update after the repository has merged a patch; also re-marks
/// the record retryable.
pub(crate) async fn update_card_row<'e, E>(exec: E, card: &PendingCard) -> StoreResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE pending_cards
        SET area = ?, description = ?, action = ?, priority = ?, category = ?,
            due_date = ?, status = ?, sync_attempts = 0, last_sync_error = NULL
        WHERE id = ?
        "#,
    )
    .bind(&card.area)
    .bind(&card.description)
    .bind(&card.action)
    .bind(card.priority.as_str())
    .bind(card.category.as_str())
    .bind(card.due_date.map(|d| d.to_string()))
    .bind(RecordStatus::PendingSync.as_str())
    .bind(card.id)
    .execute(exec)
    .await?;
    Ok(())
}

pub(crate) async fn delete_card_row<'e, E>(exec: E, id: i64) -> StoreResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM pending_cards WHERE id = ?")
        .bind(id)
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn delete_images_for_card<'e, E>(exec: E, card_id: i64) -> StoreResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM pending_card_images WHERE card_id = ?")
        .bind(card_id)
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn cards_with_status<'e, E>(
    exec: E,
    status: RecordStatus,
) -> StoreResult<Vec<PendingCard>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT * FROM pending_cards WHERE status = ? ORDER BY id ASC")
        .bind(status.as_str())
        .fetch_all(exec)
        .await?;
    rows.iter().map(card_from_row).collect()
}

pub(crate) async fn cards_for_company<'e, E>(
    exec: E,
    company_id: &str,
) -> StoreResult<Vec<PendingCard>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT * FROM pending_cards WHERE company_id = ? ORDER BY id ASC")
        .bind(company_id)
        .fetch_all(exec)
        .await?;
    rows.iter().map(card_from_row).collect()
}

pub(crate) async fn images_for_card<'e, E>(
    exec: E,
    card_id: i64,
) -> StoreResult<Vec<PendingCardImage>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT * FROM pending_card_images WHERE card_id = ? ORDER BY id ASC")
        .bind(card_id)
        .fetch_all(exec)
        .await?;
    rows.iter().map(image_from_row).collect()
}

pub(crate) async fn count_cards_with_status<'e, E>(
    exec: E,
    status: RecordStatus,
) -> StoreResult<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_cards WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(exec)
        .await?;
    Ok(count)
}

/// Records a failed sync pass; the status flips to the dead-letter value
/// once the attempt counter reaches the ceiling.
pub(crate) async fn mark_card_failed<'e, E>(
    exec: E,
    id: i64,
    error: &str,
    max_attempts: i64,
) -> StoreResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE pending_cards
        SET sync_attempts = sync_attempts + 1,
            last_sync_error = ?,
            status = CASE WHEN sync_attempts + 1 >= ? THEN 'sync_blocked' ELSE status END
        WHERE id = ?
        "#,
    )
    .bind(error)
    .bind(max_attempts)
    .bind(id)
    .execute(exec)
    .await?;
    Ok(())
}

pub(crate) async fn insert_audit<'e, E>(
    exec: E,
    audit: &NewAudit,
    temp_id: &str,
    total_score: f64,
    created_at: DateTime<Utc>,
) -> StoreResult<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO pending_audits (
            temp_id, title, area, auditor, audit_date, total_score,
            company_id, user_id, status, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(temp_id)
    .bind(&audit.title)
    .bind(&audit.area)
    .bind(&audit.auditor)
    .bind(audit.audit_date.to_string())
    .bind(total_score)
    .bind(audit.company_id.as_deref().unwrap_or(crate::models::OFFLINE_PLACEHOLDER))
    .bind(audit.user_id.as_deref().unwrap_or(crate::models::OFFLINE_PLACEHOLDER))
    .bind(RecordStatus::PendingSync.as_str())
    .bind(created_at.to_rfc3339())
    .execute(exec)
    .await?;

    Ok(result.last_insert_rowid())
}

pub(crate) async fn insert_audit_entry<'e, E>(
    exec: E,
    audit_id: i64,
    entry: &NewAuditEntry,
) -> StoreResult<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO pending_audit_entries (audit_id, section, question, score, comment)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(audit_id)
    .bind(entry.section.as_str())
    .bind(&entry.question)
    .bind(entry.score)
    .bind(&entry.comment)
    .execute(exec)
    .await?;

    Ok(result.last_insert_rowid())
}

pub(crate) async fn get_audit<'e, E>(exec: E, id: i64) -> StoreResult<Option<PendingAudit>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM pending_audits WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(audit_from_row).transpose()
}

pub(crate) async fn audit_by_temp_id<'e, E>(
    exec: E,
    temp_id: &str,
) -> StoreResult<Option<PendingAudit>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM pending_audits WHERE temp_id = ?")
        .bind(temp_id)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(audit_from_row).transpose()
}

pub(crate) async fn delete_audit_row<'e, E>(exec: E, id: i64) -> StoreResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM pending_audits WHERE id = ?")
        .bind(id)
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn delete_entries_for_audit<'e, E>(exec: E, audit_id: i64) -> StoreResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM pending_audit_entries WHERE audit_id = ?")
        .bind(audit_id)
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn audits_with_status<'e, E>(
    exec: E,
    status: RecordStatus,
) -> StoreResult<Vec<PendingAudit>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT * FROM pending_audits WHERE status = ? ORDER BY id ASC")
        .bind(status.as_str())
        .fetch_all(exec)
        .await?;
    rows.iter().map(audit_from_row).collect()
}

pub(crate) async fn entries_for_audit<'e, E>(
    exec: E,
    audit_id: i64,
) -> StoreResult<Vec<PendingAuditEntry>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT * FROM pending_audit_entries WHERE audit_id = ? ORDER BY id ASC")
        .bind(audit_id)
        .fetch_all(exec)
        .await?;
    rows.iter().map(entry_from_row).collect()
}

pub(crate) async fn count_audits_with_status<'e, E>(
    exec: E,
    status: RecordStatus,
) -> StoreResult<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_audits WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(exec)
        .await?;
    Ok(count)
}

pub(crate) async fn mark_audit_failed<'e, E>(
    exec: E,
    id: i64,
    error: &str,
    max_attempts: i64,
) -> StoreResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE pending_audits
        SET sync_attempts = sync_attempts + 1,
            last_sync_error = ?,
            status = CASE WHEN sync_attempts + 1 >= ? THEN 'sync_blocked' ELSE status END
        WHERE id = ?
        "#,
    )
    .bind(error)
    .bind(max_attempts)
    .bind(id)
    .execute(exec)
    .await?;
    Ok(())
}

pub(crate) async fn delete_orphan_images<'e, E>(exec: E) -> StoreResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "DELETE FROM pending_card_images WHERE card_id NOT IN (SELECT id FROM pending_cards)",
    )
    .execute(exec)
    .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn delete_orphan_entries<'e, E>(exec: E) -> StoreResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "DELETE FROM pending_audit_entries WHERE audit_id NOT IN (SELECT id FROM pending_audits)",
    )
    .execute(exec)
    .await?;
    Ok(result.rows_affected())
}

fn card_from_row(row: &SqliteRow) -> StoreResult<PendingCard> {
    let priority: String = row.try_get("priority")?;
    let category: String = row.try_get("category")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let due_date: Option<String> = row.try_get("due_date")?;

    Ok(PendingCard {
        id: row.try_get("id")?,
        area: row.try_get("area")?,
        description: row.try_get("description")?,
        action: row.try_get("action")?,
        priority: Priority::from_str(&priority)?,
        category: CardCategory::from_str(&category)?,
        status: RecordStatus::from_str(&status)?,
        created_at: parse_timestamp(&created_at)?,
        company_id: row.try_get("company_id")?,
        user_id: row.try_get("user_id")?,
        due_date: due_date.as_deref().map(parse_date).transpose()?,
        sync_attempts: row.try_get("sync_attempts")?,
        last_sync_error: row.try_get("last_sync_error")?,
    })
}

fn image_from_row(row: &SqliteRow) -> StoreResult<PendingCardImage> {
    let captured_at: String = row.try_get("captured_at")?;
    let tag: Option<String> = row.try_get("tag")?;

    Ok(PendingCardImage {
        id: row.try_get("id")?,
        card_id: row.try_get("card_id")?,
        data: row.try_get("data")?,
        mime_type: row.try_get("mime_type")?,
        captured_at: parse_timestamp(&captured_at)?,
        tag: tag.as_deref().map(ImageTag::from_str).transpose()?,
    })
}

fn audit_from_row(row: &SqliteRow) -> StoreResult<PendingAudit> {
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let audit_date: String = row.try_get("audit_date")?;

    Ok(PendingAudit {
        id: row.try_get("id")?,
        temp_id: row.try_get("temp_id")?,
        title: row.try_get("title")?,
        area: row.try_get("area")?,
        auditor: row.try_get("auditor")?,
        audit_date: parse_date(&audit_date)?,
        total_score: row.try_get("total_score")?,
        company_id: row.try_get("company_id")?,
        user_id: row.try_get("user_id")?,
        status: RecordStatus::from_str(&status)?,
        created_at: parse_timestamp(&created_at)?,
        sync_attempts: row.try_get("sync_attempts")?,
        last_sync_error: row.try_get("last_sync_error")?,
    })
}

fn entry_from_row(row: &SqliteRow) -> StoreResult<PendingAuditEntry> {
    let section: String = row.try_get("section")?;

    Ok(PendingAuditEntry {
        id: row.try_get("id")?,
        audit_id: row.try_get("audit_id")?,
        section: AuditSection::from_str(&section)?,
        question: row.try_get("question")?,
        score: row.try_get("score")?,
        comment: row.try_get("comment")?,
    })
}

fn parse_timestamp(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Internal(format!("invalid timestamp: {}", e)))
}

fn parse_date(s: &str) -> StoreResult<NaiveDate> {
    s.parse::<NaiveDate>()
        .map_err(|e| StoreError::Internal(format!("invalid date: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> LocalStoreConfig {
        LocalStoreConfig {
            db_path: dir
                .path()
                .join("gemba_test.db")
                .to_string_lossy()
                .into_owned(),
            max_connections: 5,
            enable_wal: true,
        }
    }

    #[tokio::test]
    async fn open_creates_schema_at_current_version() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(test_config(&dir)).await.unwrap();
        assert_eq!(store.schema_version().await.unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn reopen_preserves_rows() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        let store = LocalStore::open(config.clone()).await.unwrap();
        let card = NewCard {
            area: "Linea 2".to_string(),
            description: "missing tooling".to_string(),
            action: "restock shadow board".to_string(),
            priority: Priority::Medium,
            category: CardCategory::Seiton,
            company_id: None,
            user_id: None,
            due_date: None,
        };
        let id = insert_card(store.pool(), &card, Utc::now()).await.unwrap();
        store.close().await.unwrap();

        let store = LocalStore::open(config).await.unwrap();
        let found = get_card(store.pool(), id).await.unwrap().unwrap();
        assert_eq!(found.area, "Linea 2");
        assert_eq!(found.company_id, crate::models::OFFLINE_PLACEHOLDER);
        assert_eq!(found.status, RecordStatus::PendingSync);
    }

    #[tokio::test]
    async fn v1_file_migrates_forward_without_losing_rows() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        // Lay down a v1 database by hand: same tables, no attempt columns.
        {
            let options = SqliteConnectOptions::new()
                .filename(&config.db_path)
                .create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(options)
                .await
                .unwrap();
            sqlx::query(
                r#"
                CREATE TABLE pending_cards (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    area TEXT NOT NULL,
                    description TEXT NOT NULL,
                    action TEXT NOT NULL,
                    priority TEXT NOT NULL,
                    category TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending_sync',
                    created_at TEXT NOT NULL,
                    company_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    due_date TEXT
                )
                "#,
            )
            .execute(&pool)
            .await
            .unwrap();
            sqlx::query(
                r#"
                CREATE TABLE pending_audits (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    temp_id TEXT NOT NULL,
                    title TEXT NOT NULL,
                    area TEXT NOT NULL,
                    auditor TEXT NOT NULL,
                    audit_date TEXT NOT NULL,
                    total_score REAL NOT NULL,
                    company_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending_sync',
                    created_at TEXT NOT NULL
                )
                "#,
            )
            .execute(&pool)
            .await
            .unwrap();
            sqlx::query(
                r#"
                CREATE TABLE pending_card_images (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    card_id INTEGER NOT NULL,
                    data BLOB NOT NULL,
                    mime_type TEXT NOT NULL,
                    captured_at TEXT NOT NULL,
                    tag TEXT
                )
                "#,
            )
            .execute(&pool)
            .await
            .unwrap();
            sqlx::query(
                r#"
                CREATE TABLE pending_audit_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    audit_id INTEGER NOT NULL,
                    section TEXT NOT NULL,
                    question TEXT NOT NULL,
                    score INTEGER NOT NULL,
                    comment TEXT
                )
                "#,
            )
            .execute(&pool)
            .await
            .unwrap();
            sqlx::query(
                r#"
                INSERT INTO pending_cards (
                    area, description, action, priority, category, status,
                    created_at, company_id, user_id, due_date
                ) VALUES ('Linea 1', 'spill', 'clean', 'Alta', 'Seiso',
                          'pending_sync', ?, 'offline', 'offline', NULL)
                "#,
            )
            .bind(Utc::now().to_rfc3339())
            .execute(&pool)
            .await
            .unwrap();
            sqlx::query("PRAGMA user_version = 1")
                .execute(&pool)
                .await
                .unwrap();
            pool.close().await;
        }

        let store = LocalStore::open(config).await.unwrap();
        assert_eq!(store.schema_version().await.unwrap(), SCHEMA_VERSION);

        let cards = cards_with_status(store.pool(), RecordStatus::PendingSync)
            .await
            .unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].priority, Priority::High);
        assert_eq!(cards[0].sync_attempts, 0);
        assert_eq!(cards[0].last_sync_error, None);
    }

    #[tokio::test]
    async fn newer_schema_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        {
            let store = LocalStore::open(config.clone()).await.unwrap();
            sqlx::query("PRAGMA user_version = 99")
                .execute(store.pool())
                .await
                .unwrap();
            store.close().await.unwrap();
        }

        match LocalStore::open(config).await {
            Err(StoreError::SchemaDowngrade { found, supported }) => {
                assert_eq!(found, 99);
                assert_eq!(supported, SCHEMA_VERSION);
            }
            other => panic!("expected SchemaDowngrade, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn unopenable_path_is_unavailable() {
        let config = LocalStoreConfig {
            db_path: "/nonexistent-root/gemba/gemba_local.db".to_string(),
            max_connections: 1,
            enable_wal: false,
        };
        match LocalStore::open(config).await {
            Err(StoreError::Unavailable(_)) => {}
            other => panic!("expected Unavailable, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn vacuum_runs() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(test_config(&dir)).await.unwrap();
        store.vacuum().await.unwrap();
    }
}
