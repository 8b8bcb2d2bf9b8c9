//! Configuration for the engine and the HTTP remote.

use serde::{Deserialize, Serialize};

/// Configuration for the sync engine and orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Failed attempts after which an action is evicted.
    pub max_retries: u32,
    /// Run a pass as soon as the orchestrator starts.
    pub sync_on_startup: bool,
    /// Capacity of the [`SyncEvent`](crate::SyncEvent) broadcast channel.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            sync_on_startup: true,
            event_capacity: 64,
        }
    }
}

/// Where and how to reach the remote mutation API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRemoteConfig {
    /// Base URL, e.g. `https://api.wayfare.app`. Routes are appended under `/api/v1`.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub auth_token: Option<String>,
    /// Per-request timeout (ms).
    pub timeout_ms: u64,
}

impl Default for HttpRemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8787".to_string(),
            auth_token: None,
            timeout_ms: 30_000,
        }
    }
}
