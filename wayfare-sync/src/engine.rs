//! Replays the pending-action ledger against the remote.
//!
//! A pass walks the ledger oldest first and sends each action through the
//! [`RemoteApi`]. An action leaves the ledger only after the server confirms
//! it, or when it is evicted: rejected outright, undecodable, or out of
//! retries. Evicted actions are recorded as [`FailedAction`]s and reported in
//! the pass summary.
//!
//! At most one pass runs at a time. A request that arrives mid-pass queues a
//! single follow-up pass and waits for it.

use crate::blocking::with_store;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::{RemoteApi, dispatch};
use crate::session::SessionProvider;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use wayfare_model::{Action, EntityRef, FailedAction, FailureReason, Item, PendingAction, Trip};
use wayfare_storage::{LocalStore, Record, StorageResult, StoreTx};
use wayfare_types::{ActionId, OwnerId};

/// Whether a failed action is still queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FailureOutcome {
    /// Kept in the ledger for the next pass.
    Retained,
    /// Removed from the ledger and recorded as a [`FailedAction`].
    Evicted { reason: FailureReason },
}

/// One action that did not sync during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionFailure {
    pub action_id: ActionId,
    pub action_type: String,
    pub message: String,
    /// Failed attempts so far, this one included.
    pub retries: u32,
    pub outcome: FailureOutcome,
}

impl ActionFailure {
    pub fn is_evicted(&self) -> bool {
        matches!(self.outcome, FailureOutcome::Evicted { .. })
    }
}

/// Result of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Actions confirmed by the server and removed from the ledger.
    pub synced: usize,
    /// Actions that failed, whether retained or evicted.
    pub failed: usize,
    pub errors: Vec<ActionFailure>,
}

impl SyncSummary {
    pub fn evicted(&self) -> impl Iterator<Item = &ActionFailure> {
        self.errors.iter().filter(|f| f.is_evicted())
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Progress notifications, broadcast to every subscriber.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    PassStarted { pending: usize },
    ActionSynced { action_id: ActionId, action_type: String },
    ActionEvicted(FailedAction),
    SyncComplete(SyncSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flight {
    Idle,
    Running { generation: u64, follow_up: bool },
}

#[derive(Debug, Clone)]
enum PassOutcome {
    Completed(SyncSummary),
    Failed(String),
    /// Cancelled, dropped mid-pass, or skipped.
    Abandoned,
}

impl PassOutcome {
    fn of(result: &SyncResult<SyncSummary>) -> Self {
        match result {
            Ok(summary) => PassOutcome::Completed(summary.clone()),
            Err(SyncError::Cancelled) => PassOutcome::Abandoned,
            Err(e) => PassOutcome::Failed(e.to_string()),
        }
    }

    fn into_result(self) -> SyncResult<SyncSummary> {
        match self {
            PassOutcome::Completed(summary) => Ok(summary),
            PassOutcome::Failed(message) => Err(SyncError::PassFailed(message)),
            PassOutcome::Abandoned => Err(SyncError::Cancelled),
        }
    }
}

/// Latest finished pass; waiters watch `generation`.
#[derive(Debug, Clone)]
struct PassRecord {
    generation: u64,
    outcome: PassOutcome,
}

struct Inner {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteApi>,
    session: Arc<dyn SessionProvider>,
    config: SyncConfig,
    flight: Mutex<Flight>,
    completed: watch::Sender<PassRecord>,
    events: broadcast::Sender<SyncEvent>,
    cancelled: AtomicBool,
}

impl Inner {
    fn flight(&self) -> MutexGuard<'_, Flight> {
        self.flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns the flight state to idle if a running pass is dropped.
struct FlightGuard<'a> {
    inner: &'a Inner,
    generation: u64,
    armed: bool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut flight = self.inner.flight();
        let last = match *flight {
            Flight::Running {
                follow_up: true, ..
            } => self.generation + 1,
            _ => self.generation,
        };
        self.inner.completed.send_replace(PassRecord {
            generation: last,
            outcome: PassOutcome::Abandoned,
        });
        *flight = Flight::Idle;
        drop(flight);
        warn!(generation = self.generation, "sync pass dropped before completion");
    }
}

enum Claim {
    Run(u64),
    Wait(u64),
}

/// The sync engine. Cheap to clone; clones share one ledger and one
/// single-flight state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteApi>,
        session: Arc<dyn SessionProvider>,
        config: SyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        // Generation 0 is never waited on.
        let (completed, _) = watch::channel(PassRecord {
            generation: 0,
            outcome: PassOutcome::Abandoned,
        });
        Self {
            inner: Arc::new(Inner {
                store,
                remote,
                session,
                config,
                flight: Mutex::new(Flight::Idle),
                completed,
                events,
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Whether a pass is in flight.
    pub fn is_running(&self) -> bool {
        matches!(*self.inner.flight(), Flight::Running { .. })
    }

    /// Stops the current pass after the action in flight and refuses new
    /// passes. Used at teardown.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            info!("sync engine cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub async fn pending_count(&self) -> SyncResult<usize> {
        with_store(&self.inner.store, |store| store.pending_count()).await
    }

    /// Evicted actions not yet dismissed, most recent first.
    pub async fn failed_actions(&self) -> SyncResult<Vec<FailedAction>> {
        with_store(&self.inner.store, |store| store.failed_actions()).await
    }

    pub async fn dismiss_failed(&self, id: ActionId) -> SyncResult<bool> {
        with_store(&self.inner.store, move |store| store.dismiss_failed(&id)).await
    }

    pub async fn clear_failed(&self) -> SyncResult<usize> {
        with_store(&self.inner.store, |store| store.clear_failed()).await
    }

    /// Runs one sync pass, or, if one is already running, waits for the
    /// follow-up pass queued behind it and returns that pass's summary.
    pub async fn run_sync_pass(&self) -> SyncResult<SyncSummary> {
        if self.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let mut completed = self.inner.completed.subscribe();
        let claim = {
            let mut flight = self.inner.flight();
            match *flight {
                Flight::Idle => {
                    let generation = self.inner.completed.borrow().generation + 1;
                    *flight = Flight::Running {
                        generation,
                        follow_up: false,
                    };
                    Claim::Run(generation)
                }
                Flight::Running { generation, .. } => {
                    *flight = Flight::Running {
                        generation,
                        follow_up: true,
                    };
                    Claim::Wait(generation + 1)
                }
            }
        };

        match claim {
            Claim::Run(generation) => self.drive(generation).await,
            Claim::Wait(target) => {
                debug!(target, "sync pass in flight; waiting for follow-up");
                let outcome = completed
                    .wait_for(|record| record.generation >= target)
                    .await
                    .map_err(|_| SyncError::ChannelClosed)?
                    .outcome
                    .clone();
                outcome.into_result()
            }
        }
    }

    /// Runs passes until no follow-up is queued. Holds the flight.
    async fn drive(&self, mut generation: u64) -> SyncResult<SyncSummary> {
        let mut guard = FlightGuard {
            inner: &self.inner,
            generation,
            armed: true,
        };

        loop {
            let result = self.run_pass().await;

            // Publish under the flight lock so a new runner never reuses a generation.
            let again = {
                let mut flight = self.inner.flight();
                let queued = matches!(
                    *flight,
                    Flight::Running {
                        follow_up: true,
                        ..
                    }
                );
                self.inner.completed.send_replace(PassRecord {
                    generation,
                    outcome: PassOutcome::of(&result),
                });
                if queued && !self.is_cancelled() {
                    *flight = Flight::Running {
                        generation: generation + 1,
                        follow_up: false,
                    };
                    true
                } else {
                    if queued {
                        self.inner.completed.send_replace(PassRecord {
                            generation: generation + 1,
                            outcome: PassOutcome::Abandoned,
                        });
                    }
                    *flight = Flight::Idle;
                    false
                }
            };

            if !again {
                guard.armed = false;
                return result;
            }
            generation += 1;
            guard.generation = generation;
            debug!(generation, "running follow-up sync pass");
        }
    }

    async fn run_pass(&self) -> SyncResult<SyncSummary> {
        let actions = with_store(&self.inner.store, |store| store.pending_actions()).await?;
        info!(pending = actions.len(), "starting sync pass");
        let _ = self.inner.events.send(SyncEvent::PassStarted {
            pending: actions.len(),
        });

        let mut summary = SyncSummary::default();
        for action in actions {
            if self.is_cancelled() {
                info!(
                    synced = summary.synced,
                    failed = summary.failed,
                    "sync pass cancelled"
                );
                return Err(SyncError::Cancelled);
            }
            let (action_id, retries) = (action.id, action.retries);
            let action_type = action.action_type.clone();
            if let Err(e) = self.process(action, &mut summary).await {
                // The ledger entry is untouched; the next pass tries again.
                warn!(
                    %action_id,
                    %action_type,
                    error = %e,
                    "could not record replay outcome; action stays queued"
                );
                summary.failed += 1;
                summary.errors.push(ActionFailure {
                    action_id,
                    action_type,
                    message: e.to_string(),
                    retries,
                    outcome: FailureOutcome::Retained,
                });
            }
        }

        info!(
            synced = summary.synced,
            failed = summary.failed,
            "sync pass complete"
        );
        let _ = self.inner.events.send(SyncEvent::SyncComplete(summary.clone()));
        Ok(summary)
    }

    async fn process(&self, action: PendingAction, summary: &mut SyncSummary) -> SyncResult<()> {
        if action.retries >= self.inner.config.max_retries {
            let message = format!("gave up after {} failed attempts", action.retries);
            return self
                .evict(action, FailureReason::RetriesExhausted, message, summary)
                .await;
        }

        let mut decoded = match action.decode() {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(
                    action_id = %action.id,
                    action_type = %action.action_type,
                    error = %e,
                    "cannot decode pending action"
                );
                let message = e.to_string();
                return self
                    .evict(action, FailureReason::Undecodable, message, summary)
                    .await;
            }
        };
        let adopted = self.adopt_session_owner(&mut decoded);

        debug!(
            action_id = %action.id,
            action_type = %action.action_type,
            retries = action.retries,
            "replaying action"
        );
        match dispatch(self.inner.remote.as_ref(), &decoded).await {
            Ok(result) if result.success => {
                self.confirm(action, &decoded, adopted, summary).await
            }
            Ok(result) => {
                let message = result.message_or("remote reported failure").to_string();
                if result.is_permanent_failure() {
                    self.evict(action, FailureReason::Rejected, message, summary)
                        .await
                } else {
                    self.retry(action, message, summary).await
                }
            }
            Err(e) if e.is_retryable() => self.retry(action, e.to_string(), summary).await,
            Err(e) => {
                self.evict(action, FailureReason::Rejected, e.to_string(), summary)
                    .await
            }
        }
    }

    /// Swaps a sentinel owner on a create for the signed-in identity.
    fn adopt_session_owner(&self, action: &mut Action) -> Option<OwnerId> {
        let owner = match action {
            Action::CreateTrip(new) => &mut new.owner_id,
            Action::CreateItem(new) => &mut new.owner_id,
            _ => return None,
        };
        if !owner.is_offline_sentinel() {
            return None;
        }
        let session = self
            .inner
            .session
            .current_owner()
            .filter(|o| !o.is_offline_sentinel())?;
        info!(owner = %session, "replaying sentinel-owned create as session owner");
        *owner = session.clone();
        Some(session)
    }

    async fn confirm(
        &self,
        action: PendingAction,
        decoded: &Action,
        owner: Option<OwnerId>,
        summary: &mut SyncSummary,
    ) -> SyncResult<()> {
        let entity = decoded.entity();
        let marks_synced = decoded.marks_synced();
        let action_id = action.id;
        let entity_key = action.entity_key.clone();

        with_store(&self.inner.store, move |store| {
            store.transaction(|tx| {
                tx.remove_action(&action_id)?;
                // Later edits to the same entity are still unconfirmed.
                let settled = tx.pending_for_entity(&entity_key)? == 0;
                let synced = marks_synced && settled;
                match entity {
                    EntityRef::Trip(id) => reconcile::<Trip>(tx, &id.to_string(), synced, owner),
                    EntityRef::Item(id) => reconcile::<Item>(tx, &id.to_string(), synced, owner),
                }
            })
        })
        .await?;

        debug!(%action_id, action_type = %action.action_type, "action synced");
        summary.synced += 1;
        let _ = self.inner.events.send(SyncEvent::ActionSynced {
            action_id,
            action_type: action.action_type,
        });
        Ok(())
    }

    async fn retry(
        &self,
        mut action: PendingAction,
        message: String,
        summary: &mut SyncSummary,
    ) -> SyncResult<()> {
        action.retries += 1;
        if action.retries >= self.inner.config.max_retries {
            return self
                .evict(action, FailureReason::RetriesExhausted, message, summary)
                .await;
        }

        let (action_id, retries) = (action.id, action.retries);
        with_store(&self.inner.store, move |store| {
            store.set_retries(&action_id, retries)
        })
        .await?;

        warn!(
            %action_id,
            action_type = %action.action_type,
            retries,
            error = %message,
            "replay failed; will retry"
        );
        summary.failed += 1;
        summary.errors.push(ActionFailure {
            action_id,
            action_type: action.action_type,
            message,
            retries,
            outcome: FailureOutcome::Retained,
        });
        Ok(())
    }

    async fn evict(
        &self,
        action: PendingAction,
        reason: FailureReason,
        message: String,
        summary: &mut SyncSummary,
    ) -> SyncResult<()> {
        let failed = FailedAction::new(action, reason, message);
        let record = failed.clone();
        with_store(&self.inner.store, move |store| store.evict_action(&record)).await?;

        warn!(
            action_id = %failed.action.id,
            action_type = %failed.action.action_type,
            retries = failed.action.retries,
            %reason,
            error = %failed.message,
            "evicted pending action"
        );
        summary.failed += 1;
        summary.errors.push(ActionFailure {
            action_id: failed.action.id,
            action_type: failed.action.action_type.clone(),
            message: failed.message.clone(),
            retries: failed.action.retries,
            outcome: FailureOutcome::Evicted { reason },
        });
        let _ = self.inner.events.send(SyncEvent::ActionEvicted(failed));
        Ok(())
    }
}

/// Marks a confirmed entity synced and adopts the server-side owner.
fn reconcile<R: Record>(
    tx: &StoreTx<'_>,
    key: &str,
    synced: bool,
    owner: Option<OwnerId>,
) -> StorageResult<()> {
    if !synced && owner.is_none() {
        return Ok(());
    }
    tx.update::<R>(key, |record| {
        if synced {
            record.set_synced(true);
        }
        if let Some(owner) = owner {
            record.set_owner(owner);
        }
    })?;
    Ok(())
}
