//! Connectivity monitor
//!
//! Tracks the last-known online state and republishes it, together with the
//! pending-record counts, on every probe cycle. Host-level online/offline
//! edge events feed in through [`ConnectivityMonitor::set_online`], but the
//! periodic re-probe runs regardless of edges: platform transition events
//! are known to produce false positives, so dependents get a fresh snapshot
//! every interval and never have to trust a single edge.
//!
//! The monitor only supplies state and signals. Whether a signal actually
//! starts a sync pass is the [`SyncTrigger`] policy, and the engine is
//! driven through an [`mpsc`] handle the application wires up, so the
//! trigger choice stays configuration rather than a dead code path.

use crate::config::RemoteConfig;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use gemba_store::{PendingCounts, PendingRepository};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// Default period between reachability probes.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// What the monitor last observed, published through the watch channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectivitySnapshot {
    pub online: bool,
    pub pending_cards: i64,
    pub pending_audits: i64,
}

impl ConnectivitySnapshot {
    pub fn pending_total(&self) -> i64 {
        self.pending_cards + self.pending_audits
    }
}

/// When the monitor asks for a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Sync only on explicit user action. The default.
    Manual,
    /// Fire once per offline-to-online transition.
    OnReconnect,
    /// Fire on probe ticks while online, at most once per given period.
    Periodic(Duration),
}

/// Why a sync pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSignal {
    Reconnect,
    Timer,
}

/// Network reachability check, probed on a timer.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Probes the remote store's health endpoint.
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(config: &RemoteConfig) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| SyncError::Config(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}/auth/v1/health", config.endpoint),
        })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn is_reachable(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Last-known connectivity state plus the pending-count publication duty.
pub struct ConnectivityMonitor {
    online: AtomicBool,
    trigger: SyncTrigger,
    snapshot_tx: watch::Sender<ConnectivitySnapshot>,
    sync_tx: mpsc::Sender<SyncSignal>,
    last_periodic: Mutex<Option<Instant>>,
}

impl ConnectivityMonitor {
    /// Build a monitor with the given trigger policy. Returns the receiver
    /// the application drains to run sync passes; with `SyncTrigger::Manual`
    /// nothing is ever sent on it.
    pub fn new(trigger: SyncTrigger) -> (Self, mpsc::Receiver<SyncSignal>) {
        let (snapshot_tx, _) = watch::channel(ConnectivitySnapshot {
            online: true,
            ..ConnectivitySnapshot::default()
        });
        let (sync_tx, sync_rx) = mpsc::channel(1);

        let monitor = Self {
            online: AtomicBool::new(true),
            trigger,
            snapshot_tx,
            sync_tx,
            last_periodic: Mutex::new(None),
        };
        (monitor, sync_rx)
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Watch the published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivitySnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Host-level transition signal (browser/tauri online/offline event).
    pub fn set_online(&self, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        self.snapshot_tx.send_modify(|s| s.online = online);

        if online && !was_online {
            tracing::info!("connectivity restored");
            if self.trigger == SyncTrigger::OnReconnect {
                self.request_sync(SyncSignal::Reconnect);
            }
        } else if !online && was_online {
            tracing::info!("connectivity lost, captures stay local");
        }
    }

    /// Republish the pending counts without touching the online flag. The
    /// sync engine calls this at the end of every pass.
    pub fn publish_counts(&self, counts: PendingCounts) {
        self.snapshot_tx.send_modify(|s| {
            s.pending_cards = counts.cards;
            s.pending_audits = counts.audits;
        });
    }

    /// One probe/recount/republish cycle. Factored out of [`run`] so tests
    /// can drive cycles directly.
    ///
    /// [`run`]: ConnectivityMonitor::run
    pub async fn tick(
        &self,
        probe: &dyn ReachabilityProbe,
        repo: &PendingRepository,
    ) -> SyncResult<ConnectivitySnapshot> {
        let was_online = self.online.load(Ordering::SeqCst);
        let online = probe.is_reachable().await;
        self.online.store(online, Ordering::SeqCst);

        let counts = repo.pending_counts().await?;
        let snapshot = ConnectivitySnapshot {
            online,
            pending_cards: counts.cards,
            pending_audits: counts.audits,
        };
        self.snapshot_tx.send_replace(snapshot);

        if online && counts.total() > 0 {
            match self.trigger {
                SyncTrigger::Manual => {}
                SyncTrigger::OnReconnect => {
                    if !was_online {
                        self.request_sync(SyncSignal::Reconnect);
                    }
                }
                SyncTrigger::Periodic(min_gap) => {
                    if self.periodic_due(min_gap) {
                        self.request_sync(SyncSignal::Timer);
                    }
                }
            }
        }

        Ok(snapshot)
    }

    /// Probe loop. Store errors are logged and the loop keeps going; a
    /// broken count query must not stop connectivity reporting.
    pub async fn run(
        &self,
        probe: &dyn ReachabilityProbe,
        repo: &PendingRepository,
        probe_interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(probe_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = self.tick(probe, repo).await {
                tracing::warn!(error = %e, "connectivity probe cycle failed");
            }
        }
    }

    fn periodic_due(&self, min_gap: Duration) -> bool {
        let Ok(mut last) = self.last_periodic.lock() else {
            return false;
        };
        match *last {
            Some(at) if at.elapsed() < min_gap => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }

    fn request_sync(&self, signal: SyncSignal) {
        // A full channel means a request is already queued; dropping the
        // new one loses nothing.
        if self.sync_tx.try_send(signal).is_ok() {
            tracing::debug!(?signal, "sync pass requested");
        }
    }
}
