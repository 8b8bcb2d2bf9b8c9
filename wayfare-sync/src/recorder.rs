//! The write path.
//!
//! Every mutating user operation goes through [`ActionRecorder`], which
//! makes one decision: online, call the remote and return its answer;
//! offline, write the expected result locally and queue the call in the
//! pending-action ledger, both in one transaction.

use crate::blocking::with_store;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteApi;
use crate::session::SessionProvider;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use wayfare_model::{
    Action, ActionResult, EntityRef, Item, ItemDraft, ItemPatch, ItemUpdate, PendingAction,
    Trip, TripDraft, TripPatch, TripUpdate, now_millis,
};
use wayfare_storage::{Index, LocalStore, Record, StorageResult, StoreTx};
use wayfare_types::{HybridTimestamp, ItemId, OwnerId, TripId};

/// Message attached to every optimistic result.
pub const OFFLINE_MESSAGE: &str = "Saved offline; will sync when back online";

/// Local state left by an optimistic write.
#[derive(Debug)]
enum Cached {
    Trip(Trip),
    Item(Item),
    /// Deleted, or the target was not in the local cache.
    Nothing,
}

impl Cached {
    fn into_trip(self) -> Option<Trip> {
        match self {
            Cached::Trip(trip) => Some(trip),
            _ => None,
        }
    }

    fn into_item(self) -> Option<Item> {
        match self {
            Cached::Item(item) => Some(item),
            _ => None,
        }
    }

    fn into_json(self) -> SyncResult<Option<Value>> {
        Ok(match self {
            Cached::Trip(trip) => Some(serde_json::to_value(trip)?),
            Cached::Item(item) => Some(serde_json::to_value(item)?),
            Cached::Nothing => None,
        })
    }
}

fn offline_result<T>(data: Option<T>) -> ActionResult<T> {
    ActionResult {
        success: true,
        data,
        message: Some(OFFLINE_MESSAGE.to_string()),
        retryable: None,
    }
}

/// Decides per call between the remote and the local ledger.
pub struct ActionRecorder {
    remote: Arc<dyn RemoteApi>,
    store: Option<Arc<LocalStore>>,
    connectivity: Arc<ConnectivityMonitor>,
    session: Arc<dyn SessionProvider>,
    /// Last timestamp handed to the ledger.
    clock: Mutex<HybridTimestamp>,
}

impl ActionRecorder {
    /// Creates a recorder. Pass `None` for `store` when local storage could
    /// not be opened: online calls still work, offline writes fail with
    /// [`SyncError::StorageUnavailable`].
    pub fn new(
        remote: Arc<dyn RemoteApi>,
        store: Option<Arc<LocalStore>>,
        connectivity: Arc<ConnectivityMonitor>,
        session: Arc<dyn SessionProvider>,
    ) -> Self {
        let last = match store.as_ref().map(|s| s.last_action_timestamp()) {
            Some(Ok(Some(ts))) => ts,
            Some(Err(e)) => {
                warn!(error = %e, "could not read ledger clock; starting fresh");
                HybridTimestamp::new(0, 0)
            }
            _ => HybridTimestamp::new(0, 0),
        };
        Self {
            remote,
            store,
            connectivity,
            session,
            clock: Mutex::new(last),
        }
    }

    /// Whether offline writes can be recorded at all.
    pub fn has_offline_support(&self) -> bool {
        self.store.is_some()
    }

    // ── Trips ────────────────────────────────────────────────────

    pub async fn create_trip(&self, draft: TripDraft) -> SyncResult<ActionResult<Trip>> {
        draft.validate()?;
        let new = draft.into_new(TripId::new(), self.resolve_owner());

        if self.connectivity.is_online() {
            let result = self.remote.create_trip(&new).await?;
            if result.success {
                self.cache_confirmed(EntityRef::Trip(new.id), result.data.clone())
                    .await;
            }
            return Ok(result);
        }

        let cached = self.write_offline(Action::CreateTrip(new)).await?;
        Ok(offline_result(cached.into_trip()))
    }

    pub async fn update_trip(
        &self,
        id: TripId,
        patch: TripPatch,
    ) -> SyncResult<ActionResult<Trip>> {
        patch.validate()?;
        let update = TripUpdate { id, patch };

        if self.connectivity.is_online() {
            let result = self.remote.update_trip(&update).await?;
            if result.success {
                self.cache_confirmed(EntityRef::Trip(id), result.data.clone())
                    .await;
            }
            return Ok(result);
        }

        let cached = self.write_offline(Action::UpdateTrip(update)).await?;
        Ok(offline_result(cached.into_trip()))
    }

    pub async fn delete_trip(&self, id: TripId) -> SyncResult<ActionResult<()>> {
        if self.connectivity.is_online() {
            let result = self.remote.delete_trip(id).await?;
            if result.success {
                self.uncache(EntityRef::Trip(id)).await;
            }
            return Ok(result);
        }

        self.write_offline(Action::DeleteTrip { id }).await?;
        Ok(offline_result(None))
    }

    // ── Items ────────────────────────────────────────────────────

    pub async fn create_item(
        &self,
        trip_id: TripId,
        draft: ItemDraft,
    ) -> SyncResult<ActionResult<Item>> {
        draft.validate()?;
        let new = draft.into_new(ItemId::new(), trip_id, self.resolve_owner());

        if self.connectivity.is_online() {
            let result = self.remote.create_item(&new).await?;
            if result.success {
                self.cache_confirmed(EntityRef::Item(new.id), result.data.clone())
                    .await;
            }
            return Ok(result);
        }

        let cached = self.write_offline(Action::CreateItem(new)).await?;
        Ok(offline_result(cached.into_item()))
    }

    pub async fn update_item(
        &self,
        id: ItemId,
        patch: ItemPatch,
    ) -> SyncResult<ActionResult<Item>> {
        patch.validate()?;
        let update = ItemUpdate { id, patch };

        if self.connectivity.is_online() {
            let result = self.remote.update_item(&update).await?;
            if result.success {
                self.cache_confirmed(EntityRef::Item(id), result.data.clone())
                    .await;
            }
            return Ok(result);
        }

        let cached = self.write_offline(Action::UpdateItem(update)).await?;
        Ok(offline_result(cached.into_item()))
    }

    pub async fn delete_item(&self, id: ItemId) -> SyncResult<ActionResult<()>> {
        if self.connectivity.is_online() {
            let result = self.remote.delete_item(id).await?;
            if result.success {
                self.uncache(EntityRef::Item(id)).await;
            }
            return Ok(result);
        }

        self.write_offline(Action::DeleteItem { id }).await?;
        Ok(offline_result(None))
    }

    pub async fn toggle_purchased(
        &self,
        id: ItemId,
        purchased: bool,
    ) -> SyncResult<ActionResult<Item>> {
        if self.connectivity.is_online() {
            let result = self.remote.toggle_purchased(id, purchased).await?;
            if result.success {
                self.cache_confirmed(EntityRef::Item(id), result.data.clone())
                    .await;
            }
            return Ok(result);
        }

        let cached = self
            .write_offline(Action::TogglePurchased { id, purchased })
            .await?;
        Ok(offline_result(cached.into_item()))
    }

    /// Records `action` through the offline path regardless of connectivity:
    /// optimistic local write plus ledger entry, in one transaction.
    pub async fn record_offline_write(&self, action: Action) -> SyncResult<ActionResult<Value>> {
        let cached = self.write_offline(action).await?;
        Ok(offline_result(cached.into_json()?))
    }

    // ── Internals ────────────────────────────────────────────────

    async fn write_offline(&self, action: Action) -> SyncResult<Cached> {
        let store = self.store.as_ref().ok_or_else(|| {
            SyncError::StorageUnavailable("no local store; cannot record offline write".into())
        })?;
        let pending = PendingAction::new(&action, self.next_timestamp())?;
        let action_id = pending.id;
        let action_type = action.action_type();
        let now = now_millis();

        let cached = with_store(store, move |store| {
            store.transaction(|tx| {
                let cached = apply_optimistic(tx, &action, now)?;
                tx.append_action(&pending)?;
                Ok(cached)
            })
        })
        .await?;

        info!(%action_id, %action_type, "recorded offline write");
        Ok(cached)
    }

    /// Next ledger timestamp, strictly after every one handed out before.
    fn next_timestamp(&self) -> HybridTimestamp {
        let mut last = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        *last = last.tick();
        *last
    }

    fn resolve_owner(&self) -> OwnerId {
        match self.session.current_owner() {
            Some(owner) => owner,
            None => {
                warn!(
                    owner = OwnerId::OFFLINE_SENTINEL,
                    "no session available; recording under sentinel owner"
                );
                OwnerId::offline_sentinel()
            }
        }
    }

    /// Stores a server-confirmed record. Best effort: failures are logged.
    async fn cache_confirmed<R>(&self, entity: EntityRef, record: Option<R>)
    where
        R: Record + Send + 'static,
    {
        let (Some(store), Some(mut record)) = (&self.store, record) else {
            return;
        };
        let key = entity.key();
        let pending_key = key.clone();
        let outcome = with_store(store, move |store| {
            store.transaction(|tx| {
                // Still-queued edits mean the local copy is ahead of the server.
                let pending = tx.pending_for_entity(&pending_key)?;
                record.set_synced(pending == 0);
                tx.put(&record)
            })
        })
        .await;
        match outcome {
            Ok(()) => debug!(%key, "cached confirmed record"),
            Err(e) => warn!(%key, error = %e, "failed to cache confirmed record"),
        }
    }

    async fn uncache(&self, entity: EntityRef) {
        let Some(store) = &self.store else {
            return;
        };
        let key = entity.key();
        let outcome = with_store(store, move |store| {
            store.transaction(|tx| remove_cached(tx, &entity).map(|_| ()))
        })
        .await;
        if let Err(e) = outcome {
            warn!(%key, error = %e, "failed to drop deleted record from cache");
        }
    }
}

/// Applies the expected effect of `action` to the local cache.
fn apply_optimistic(tx: &StoreTx<'_>, action: &Action, now: i64) -> StorageResult<Cached> {
    match action {
        Action::CreateTrip(new) => {
            let trip = Trip::from_new(new, now);
            tx.put(&trip)?;
            Ok(Cached::Trip(trip))
        }
        Action::UpdateTrip(update) => match tx.get::<Trip>(&update.id.to_string())? {
            Some(mut trip) => {
                trip.apply(&update.patch, now);
                trip.synced = false;
                tx.put(&trip)?;
                Ok(Cached::Trip(trip))
            }
            None => {
                debug!(trip_id = %update.id, "trip not cached; queueing update only");
                Ok(Cached::Nothing)
            }
        },
        Action::CreateItem(new) => {
            let item = Item::from_new(new, now);
            tx.put(&item)?;
            Ok(Cached::Item(item))
        }
        Action::UpdateItem(update) => {
            update_cached_item(tx, update.id, now, |item| item.apply(&update.patch, now))
        }
        Action::TogglePurchased { id, purchased } => {
            update_cached_item(tx, *id, now, |item| item.purchased = *purchased)
        }
        Action::DeleteTrip { .. } | Action::DeleteItem { .. } => {
            remove_cached(tx, &action.entity())?;
            Ok(Cached::Nothing)
        }
    }
}

fn update_cached_item(
    tx: &StoreTx<'_>,
    id: ItemId,
    now: i64,
    f: impl FnOnce(&mut Item),
) -> StorageResult<Cached> {
    match tx.get::<Item>(&id.to_string())? {
        Some(mut item) => {
            f(&mut item);
            item.updated_at = now;
            item.synced = false;
            tx.put(&item)?;
            Ok(Cached::Item(item))
        }
        None => {
            debug!(item_id = %id, "item not cached; queueing change only");
            Ok(Cached::Nothing)
        }
    }
}

/// Removes an entity; a trip takes its items with it.
fn remove_cached(tx: &StoreTx<'_>, entity: &EntityRef) -> StorageResult<bool> {
    match entity {
        EntityRef::Trip(id) => {
            for item in tx.get_all_by_index::<Item>(Index::Parent, *id)? {
                tx.remove::<Item>(&item.id.to_string())?;
            }
            tx.remove::<Trip>(&id.to_string())
        }
        EntityRef::Item(id) => tx.remove::<Item>(&id.to_string()),
    }
}
