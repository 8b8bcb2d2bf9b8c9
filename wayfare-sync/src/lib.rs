//! Offline write path and sync engine for Wayfare.
//!
//! # Components
//!
//! - **ConnectivityMonitor**: current online/offline state, with change
//!   notifications
//! - **ActionRecorder**: entry point for every mutating operation; calls the
//!   remote when online, otherwise writes optimistically to the local store
//!   and queues the call in the pending-action ledger
//! - **SyncEngine**: replays the ledger against the remote, one action at a
//!   time, oldest first, with bounded retries and single-flight passes
//! - **SyncOrchestrator**: runs passes on startup, on reconnect, and on request
//! - **RemoteApi**: the mutation surface the engine replays against;
//!   [`HttpRemote`] implements it over REST
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wayfare_storage::LocalStore;
//! use wayfare_sync::{
//!     ConnectivityMonitor, HttpRemote, HttpRemoteConfig, StaticSession, SyncConfig, SyncEngine,
//!     SyncOrchestrator,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(LocalStore::open("wayfare.db")?);
//! let remote = Arc::new(HttpRemote::new(HttpRemoteConfig::default())?);
//! let session = Arc::new(StaticSession::anonymous());
//! let connectivity = Arc::new(ConnectivityMonitor::default());
//!
//! let engine = SyncEngine::new(store, remote, session, SyncConfig::default());
//! let handle = SyncOrchestrator::spawn(engine, connectivity);
//! let summary = handle.sync_now().await?;
//! println!("synced {} actions", summary.synced);
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod blocking;
mod config;
mod connectivity;
mod engine;
mod error;
mod http;
mod orchestrator;
mod recorder;
mod remote;
mod session;

pub use config::{HttpRemoteConfig, SyncConfig};
pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use engine::{ActionFailure, FailureOutcome, SyncEngine, SyncEvent, SyncSummary};
pub use error::{SyncError, SyncResult};
pub use http::HttpRemote;
pub use orchestrator::{OrchestratorHandle, SyncCommand, SyncOrchestrator};
pub use recorder::{ActionRecorder, OFFLINE_MESSAGE};
pub use remote::{RemoteApi, RemoteError, RemoteResult, dispatch, is_retryable_status};
pub use session::{SessionProvider, StaticSession};
pub use wayfare_model::{FailedAction, FailureReason};
