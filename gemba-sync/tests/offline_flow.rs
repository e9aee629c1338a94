//! End-to-end flow: capture offline, then sync once connectivity and a
//! session are available, with in-memory fakes standing in for the remote
//! collaborators.

use async_trait::async_trait;
use gemba_store::{
    AuditSection, CardCategory, LocalStore, LocalStoreConfig, NewAudit, NewAuditEntry, NewCard,
    NewCardImage, PendingRepository, Priority,
};
use gemba_sync::{
    BlobStorage, ConnectivityMonitor, RemoteStore, Session, SessionProvider, SyncConfig,
    SyncEngine, SyncError, SyncResult, SyncTrigger,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("gemba_store=debug,gemba_sync=debug")
        .with_test_writer()
        .try_init();
}

struct StubSession {
    user_id: String,
}

#[async_trait]
impl SessionProvider for StubSession {
    async fn current_session(&self) -> SyncResult<Option<Session>> {
        Ok(Some(Session {
            user_id: self.user_id.clone(),
        }))
    }
}

#[derive(Default)]
struct InMemoryRemote {
    scope: Option<String>,
    rows: Mutex<Vec<(String, serde_json::Value)>>,
    ids_by_temp_id: Mutex<HashMap<String, String>>,
    entries_failing: AtomicBool,
    next_id: AtomicU64,
}

impl InMemoryRemote {
    fn with_scope(company_id: &str) -> Self {
        Self {
            scope: Some(company_id.to_string()),
            ..Self::default()
        }
    }

    fn rows_in(&self, table: &str) -> Vec<serde_json::Value> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, row)| row.clone())
            .collect()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn company_for_user(&self, _user_id: &str) -> SyncResult<Option<String>> {
        Ok(self.scope.clone())
    }

    async fn insert(&self, table: &str, record: serde_json::Value) -> SyncResult<String> {
        if table == "auditoria_items" && self.entries_failing.load(Ordering::SeqCst) {
            return Err(SyncError::RemoteInsert("entries table locked".to_string()));
        }
        let id = format!("remote_{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        if let Some(temp_id) = record.get("temp_id").and_then(|v| v.as_str()) {
            self.ids_by_temp_id
                .lock()
                .unwrap()
                .insert(temp_id.to_string(), id.clone());
        }
        self.rows.lock().unwrap().push((table.to_string(), record));
        Ok(id)
    }

    async fn find_by_temp_id(&self, _table: &str, temp_id: &str) -> SyncResult<Option<String>> {
        Ok(self.ids_by_temp_id.lock().unwrap().get(temp_id).cloned())
    }

    async fn delete(&self, _table: &str, _id: &str) -> SyncResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct InMemoryBlobs {
    uploaded: Mutex<Vec<String>>,
}

#[async_trait]
impl BlobStorage for InMemoryBlobs {
    async fn upload(
        &self,
        bucket: &str,
        filename: &str,
        _bytes: &[u8],
        _mime_type: &str,
    ) -> SyncResult<String> {
        let url = format!("https://blobs.example.com/{}/{}", bucket, filename);
        self.uploaded.lock().unwrap().push(url.clone());
        Ok(url)
    }
}

async fn open_repo(dir: &TempDir) -> Arc<PendingRepository> {
    let config = LocalStoreConfig {
        db_path: dir
            .path()
            .join("gemba_flow.db")
            .to_string_lossy()
            .into_owned(),
        max_connections: 5,
        enable_wal: true,
    };
    let store = LocalStore::open(config).await.unwrap();
    Arc::new(PendingRepository::new(Arc::new(store)))
}

fn build_engine(
    repo: Arc<PendingRepository>,
    remote: Arc<InMemoryRemote>,
    blobs: Arc<InMemoryBlobs>,
) -> (SyncEngine, Arc<ConnectivityMonitor>) {
    let (monitor, _rx) = ConnectivityMonitor::new(SyncTrigger::Manual);
    let monitor = Arc::new(monitor);
    let engine = SyncEngine::new(
        repo,
        Arc::new(StubSession {
            user_id: "user_1".to_string(),
        }),
        remote,
        blobs,
        monitor.clone(),
        SyncConfig::default(),
    );
    (engine, monitor)
}

#[tokio::test]
async fn captured_card_reaches_remote_and_leaves_local_store() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir).await;

    let card = NewCard {
        area: "Line 1".to_string(),
        description: "spill".to_string(),
        action: "contain and degrease".to_string(),
        priority: Priority::High,
        category: CardCategory::Seiri,
        company_id: None,
        user_id: None,
        due_date: None,
    };
    let images = vec![
        NewCardImage {
            data: vec![0xFF, 0xD8, 0xFF, 0xE0],
            mime_type: "image/jpeg".to_string(),
            tag: None,
        },
        NewCardImage {
            data: vec![0x89, 0x50, 0x4E, 0x47],
            mime_type: "image/png".to_string(),
            tag: None,
        },
    ];
    repo.create_card(card, images).await.unwrap();
    assert_eq!(repo.pending_counts().await.unwrap().cards, 1);

    let remote = Arc::new(InMemoryRemote::with_scope("co_1"));
    let blobs = Arc::new(InMemoryBlobs::default());
    let (engine, monitor) = build_engine(repo.clone(), remote.clone(), blobs.clone());

    let report = engine.sync_all().await.unwrap();
    assert_eq!(report.cards_synced, 1);
    assert_eq!(report.images_uploaded, 2);

    let rows = remote.rows_in("tarjetas_rojas");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["company_id"], "co_1");
    assert_eq!(rows[0]["status"], "Abierto");
    let urls = rows[0]["image_urls"].as_array().unwrap();
    assert_eq!(urls.len(), 2);
    assert_eq!(rows[0]["image_url"], urls[0]);
    assert_eq!(blobs.uploaded.lock().unwrap().len(), 2);

    // Local store drained, counts republished to the monitor.
    assert_eq!(repo.pending_counts().await.unwrap().total(), 0);
    assert_eq!(monitor.subscribe().borrow().pending_total(), 0);
}

#[tokio::test]
async fn audit_with_entries_syncs_as_header_plus_items() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir).await;

    let entries: Vec<NewAuditEntry> = (0..25)
        .map(|i| NewAuditEntry {
            section: AuditSection::Seiso,
            question: format!("question {}", i),
            score: 3,
            comment: None,
        })
        .collect();
    let audit = NewAudit {
        title: "Auditoria semanal".to_string(),
        area: "Almacen".to_string(),
        auditor: "R. Diaz".to_string(),
        audit_date: "2026-08-05".parse().unwrap(),
        company_id: None,
        user_id: None,
    };
    let audit_id = repo.create_audit(audit, entries).await.unwrap();
    assert_eq!(
        repo.get_audit(audit_id).await.unwrap().unwrap().total_score,
        3.0
    );

    let remote = Arc::new(InMemoryRemote::with_scope("co_1"));
    let (engine, _) = build_engine(repo.clone(), remote.clone(), Arc::new(InMemoryBlobs::default()));

    let report = engine.sync_all().await.unwrap();
    assert_eq!(report.audits_synced, 1);

    let headers = remote.rows_in("auditorias");
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[0]["total_score"], 3.0);
    assert_eq!(headers[0]["company_id"], "co_1");

    let items = remote.rows_in("auditoria_items");
    assert_eq!(items.len(), 25);
    assert!(items.iter().all(|i| i["audit_id"] == "remote_0"));

    assert!(repo.list_pending_audits().await.unwrap().is_empty());
    assert!(repo.entries_for_audit(audit_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn retried_audit_reuses_remote_header_instead_of_duplicating() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir).await;

    let audit = NewAudit {
        title: "Auditoria mensual".to_string(),
        area: "Linea 3".to_string(),
        auditor: "P. Vega".to_string(),
        audit_date: "2026-08-01".parse().unwrap(),
        company_id: None,
        user_id: None,
    };
    let entries = vec![NewAuditEntry {
        section: AuditSection::Shitsuke,
        question: "standards posted".to_string(),
        score: 4,
        comment: None,
    }];
    repo.create_audit(audit, entries).await.unwrap();

    let remote = Arc::new(InMemoryRemote::with_scope("co_1"));
    remote.entries_failing.store(true, Ordering::SeqCst);
    let (engine, _) = build_engine(repo.clone(), remote.clone(), Arc::new(InMemoryBlobs::default()));

    // First pass: header lands remotely, entries fail, draft stays local.
    let report = engine.sync_all().await.unwrap();
    assert_eq!(report.audits_failed, 1);
    assert_eq!(remote.rows_in("auditorias").len(), 1);
    assert_eq!(repo.list_pending_audits().await.unwrap().len(), 1);

    // Second pass: entries table recovered. The header is found by temp_id
    // and reused, so exactly one remote header ever exists.
    remote.entries_failing.store(false, Ordering::SeqCst);
    let report = engine.sync_all().await.unwrap();
    assert_eq!(report.audits_synced, 1);
    assert_eq!(remote.rows_in("auditorias").len(), 1);
    assert_eq!(remote.rows_in("auditoria_items").len(), 1);
    assert!(repo.list_pending_audits().await.unwrap().is_empty());
}

#[tokio::test]
async fn cards_sync_oldest_first() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir).await;

    for area in ["Line 1", "Line 2", "Line 3"] {
        let card = NewCard {
            area: area.to_string(),
            description: "finding".to_string(),
            action: "fix".to_string(),
            priority: Priority::Low,
            category: CardCategory::Otro,
            company_id: None,
            user_id: None,
            due_date: None,
        };
        repo.create_card(card, vec![]).await.unwrap();
    }

    let remote = Arc::new(InMemoryRemote::with_scope("co_1"));
    let (engine, _) = build_engine(repo.clone(), remote.clone(), Arc::new(InMemoryBlobs::default()));
    engine.sync_all().await.unwrap();

    let areas: Vec<String> = remote
        .rows_in("tarjetas_rojas")
        .iter()
        .map(|r| r["area"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(areas, vec!["Line 1", "Line 2", "Line 3"]);
}
