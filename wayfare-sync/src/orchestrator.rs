//! Background task that decides when to run sync passes.
//!
//! Triggers: startup (if configured), every offline → online transition
//! seen by the [`ConnectivityMonitor`], and explicit [`SyncCommand::SyncNow`]
//! requests sent through the [`OrchestratorHandle`]. Nothing runs while the
//! device is offline.

use crate::connectivity::ConnectivityMonitor;
use crate::engine::{SyncEngine, SyncSummary};
use crate::error::{SyncError, SyncResult};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Commands accepted by a running orchestrator.
#[derive(Debug)]
pub enum SyncCommand {
    /// Run a pass now. The reply, if any, receives its result.
    SyncNow {
        reply: Option<oneshot::Sender<SyncResult<SyncSummary>>>,
    },
    Shutdown,
}

/// Handle to a spawned [`SyncOrchestrator`].
pub struct OrchestratorHandle {
    commands: mpsc::Sender<SyncCommand>,
    engine: SyncEngine,
    task: JoinHandle<()>,
}

impl OrchestratorHandle {
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Requests a pass and waits for its summary.
    pub async fn sync_now(&self) -> SyncResult<SyncSummary> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SyncCommand::SyncNow { reply: Some(reply) })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)?
    }

    /// Requests a pass without waiting for it.
    pub async fn request_sync(&self) -> SyncResult<()> {
        self.commands
            .send(SyncCommand::SyncNow { reply: None })
            .await
            .map_err(|_| SyncError::ChannelClosed)
    }

    /// Cancels the engine, stops the task and waits for it to exit.
    pub async fn shutdown(self) -> SyncResult<()> {
        self.engine.cancel();
        // The task may already be gone; joining below is what matters.
        let _ = self.commands.send(SyncCommand::Shutdown).await;
        self.task.await?;
        Ok(())
    }
}

/// Owns the sync triggers for one engine.
pub struct SyncOrchestrator {
    engine: SyncEngine,
    connectivity: Arc<ConnectivityMonitor>,
    commands: mpsc::Receiver<SyncCommand>,
}

impl SyncOrchestrator {
    /// Spawns the orchestrator on the current tokio runtime.
    pub fn spawn(engine: SyncEngine, connectivity: Arc<ConnectivityMonitor>) -> OrchestratorHandle {
        let (commands, rx) = mpsc::channel(16);
        // Subscribed here so reconnects before the task first runs are kept.
        let reconnects = connectivity.subscribe_reconnects();
        let orchestrator = Self {
            engine: engine.clone(),
            connectivity,
            commands: rx,
        };
        let task = tokio::spawn(orchestrator.run(reconnects));
        OrchestratorHandle {
            commands,
            engine,
            task,
        }
    }

    async fn run(mut self, mut reconnects: watch::Receiver<u64>) {
        if self.engine.config().sync_on_startup {
            let _ = self.sync("startup").await;
        }

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SyncCommand::SyncNow { reply }) => {
                        let result = self.sync("requested").await;
                        if let Some(reply) = reply {
                            let _ = reply.send(result);
                        }
                    }
                    Some(SyncCommand::Shutdown) | None => break,
                },
                changed = reconnects.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let count = *reconnects.borrow_and_update();
                    debug!(reconnects = count, "reconnect observed");
                    let _ = self.sync("reconnected").await;
                }
            }
        }
        info!("sync orchestrator stopped");
    }

    async fn sync(&self, trigger: &'static str) -> SyncResult<SyncSummary> {
        if self.engine.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if !self.connectivity.is_online() {
            debug!(trigger, "offline; skipping sync");
            return Err(SyncError::Offline);
        }

        info!(trigger, "sync triggered");
        let result = self.engine.run_sync_pass().await;
        if let Err(e) = &result {
            warn!(trigger, error = %e, "sync pass failed");
        }
        result
    }
}
