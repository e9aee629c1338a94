//! Connectivity-aware synchronization for offline shop-floor captures
//!
//! Provides:
//! - Connectivity monitor with periodic reachability probing and
//!   configurable sync-trigger policy
//! - Traits for the remote collaborators (session, relational store, blob
//!   storage) plus the HTTP implementation
//! - The sync engine: one single-flight pass at a time, per-record failure
//!   isolation, local deletes only after confirmed remote success

pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod remote;

pub use config::RemoteConfig;
pub use connectivity::{
    ConnectivityMonitor, ConnectivitySnapshot, HttpProbe, ReachabilityProbe, SyncSignal,
    SyncTrigger, DEFAULT_PROBE_INTERVAL,
};
pub use engine::{SyncConfig, SyncEngine, SyncReport};
pub use error::{SyncError, SyncResult};
pub use remote::{BlobStorage, HttpRemote, RemoteStore, Session, SessionProvider};
