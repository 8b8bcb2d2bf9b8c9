//! Scripted in-memory remote shared by the sync tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use wayfare_model::{
    Action, ActionResult, Item, ItemDraft, ItemUpdate, NewItem, NewTrip, Trip, TripDraft,
    TripUpdate, now_millis,
};
use wayfare_storage::LocalStore;
use wayfare_sync::{
    ActionRecorder, Connectivity, ConnectivityMonitor, RemoteApi, RemoteError, RemoteResult,
    StaticSession, SyncConfig, SyncEngine,
};
use wayfare_types::{ItemId, OwnerId, TripId};

/// What the mock answers to one call.
#[derive(Debug, Clone)]
pub enum Reply {
    Success,
    /// `success: false` with no `retryable` hint.
    Fail(String),
    /// `success: false, retryable: false`.
    Reject(String),
    Transport(RemoteError),
}

#[derive(Default)]
pub struct MockRemote {
    calls: Mutex<Vec<Action>>,
    script: Mutex<VecDeque<Reply>>,
    fallback: Mutex<Option<Reply>>,
    trips: Mutex<HashMap<TripId, Trip>>,
    items: Mutex<HashMap<ItemId, Item>>,
    delay: Mutex<Option<Duration>>,
    hang: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    on_call: Mutex<Option<CallHook>>,
}

type CallHook = Box<dyn Fn(usize) + Send + Sync>;

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues replies for the next calls, in order.
    pub fn script(&self, replies: impl IntoIterator<Item = Reply>) {
        self.script.lock().unwrap().extend(replies);
    }

    /// Reply used once the script runs out (default: success).
    pub fn always(&self, reply: Reply) {
        *self.fallback.lock().unwrap() = Some(reply);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Makes every call hang forever.
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    /// Runs `f` with the 1-based call number at the start of every call.
    pub fn on_call(&self, f: impl Fn(usize) + Send + Sync + 'static) {
        *self.on_call.lock().unwrap() = Some(Box::new(f));
    }

    pub fn calls(&self) -> Vec<Action> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn trip(&self, id: TripId) -> Option<Trip> {
        self.trips.lock().unwrap().get(&id).cloned()
    }

    pub fn item(&self, id: ItemId) -> Option<Item> {
        self.items.lock().unwrap().get(&id).cloned()
    }

    pub fn seed_item(&self, item: Item) {
        self.items.lock().unwrap().insert(item.id, item);
    }

    async fn enter(&self, action: Action) -> Reply {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(action);
            calls.len()
        };
        if let Some(hook) = self.on_call.lock().unwrap().as_ref() {
            hook(call);
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let scripted = self.script.lock().unwrap().pop_front();
        scripted
            .or_else(|| self.fallback.lock().unwrap().clone())
            .unwrap_or(Reply::Success)
    }

    fn answer<T>(reply: Reply, apply: impl FnOnce() -> Option<T>) -> RemoteResult<ActionResult<T>> {
        match reply {
            Reply::Success => Ok(ActionResult {
                success: true,
                data: apply(),
                message: None,
                retryable: None,
            }),
            Reply::Fail(message) => Ok(ActionResult::failed(message)),
            Reply::Reject(message) => Ok(ActionResult::rejected(message)),
            Reply::Transport(err) => Err(err),
        }
    }
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn create_trip(&self, trip: &NewTrip) -> RemoteResult<ActionResult<Trip>> {
        let reply = self.enter(Action::CreateTrip(trip.clone())).await;
        Self::answer(reply, || {
            let mut trips = self.trips.lock().unwrap();
            let stored = trips.entry(trip.id).or_insert_with(|| {
                let mut t = Trip::from_new(trip, now_millis());
                t.synced = true;
                t
            });
            Some(stored.clone())
        })
    }

    async fn update_trip(&self, update: &TripUpdate) -> RemoteResult<ActionResult<Trip>> {
        let reply = self.enter(Action::UpdateTrip(update.clone())).await;
        Self::answer(reply, || {
            let mut trips = self.trips.lock().unwrap();
            let trip = trips.get_mut(&update.id)?;
            trip.apply(&update.patch, now_millis());
            Some(trip.clone())
        })
    }

    async fn delete_trip(&self, id: TripId) -> RemoteResult<ActionResult<()>> {
        let reply = self.enter(Action::DeleteTrip { id }).await;
        Self::answer(reply, || {
            self.trips.lock().unwrap().remove(&id);
            None
        })
    }

    async fn create_item(&self, item: &NewItem) -> RemoteResult<ActionResult<Item>> {
        let reply = self.enter(Action::CreateItem(item.clone())).await;
        Self::answer(reply, || {
            let mut items = self.items.lock().unwrap();
            let stored = items.entry(item.id).or_insert_with(|| {
                let mut i = Item::from_new(item, now_millis());
                i.synced = true;
                i
            });
            Some(stored.clone())
        })
    }

    async fn update_item(&self, update: &ItemUpdate) -> RemoteResult<ActionResult<Item>> {
        let reply = self.enter(Action::UpdateItem(update.clone())).await;
        Self::answer(reply, || {
            let mut items = self.items.lock().unwrap();
            let item = items.get_mut(&update.id)?;
            item.apply(&update.patch, now_millis());
            Some(item.clone())
        })
    }

    async fn delete_item(&self, id: ItemId) -> RemoteResult<ActionResult<()>> {
        let reply = self.enter(Action::DeleteItem { id }).await;
        Self::answer(reply, || {
            self.items.lock().unwrap().remove(&id);
            None
        })
    }

    async fn toggle_purchased(
        &self,
        id: ItemId,
        purchased: bool,
    ) -> RemoteResult<ActionResult<Item>> {
        let reply = self.enter(Action::TogglePurchased { id, purchased }).await;
        Self::answer(reply, || {
            let mut items = self.items.lock().unwrap();
            let item = items.get_mut(&id)?;
            item.purchased = purchased;
            Some(item.clone())
        })
    }
}

/// Everything a test needs, wired together over an in-memory store.
pub struct Harness {
    pub store: Arc<LocalStore>,
    pub remote: Arc<MockRemote>,
    pub session: Arc<StaticSession>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub recorder: ActionRecorder,
    pub engine: SyncEngine,
}

impl Harness {
    /// Starts offline with no session, so writes go to the ledger.
    pub fn offline() -> Self {
        Self::build(Connectivity::Offline, None)
    }

    pub fn online_as(owner: &str) -> Self {
        Self::build(Connectivity::Online, Some(owner_id(owner)))
    }

    pub fn build(state: Connectivity, owner: Option<OwnerId>) -> Self {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let remote = MockRemote::new();
        let session = Arc::new(match owner {
            Some(owner) => StaticSession::signed_in(owner),
            None => StaticSession::anonymous(),
        });
        let connectivity = Arc::new(ConnectivityMonitor::new(state));
        let recorder = ActionRecorder::new(
            remote.clone(),
            Some(store.clone()),
            connectivity.clone(),
            session.clone(),
        );
        let engine = SyncEngine::new(
            store.clone(),
            remote.clone(),
            session.clone(),
            SyncConfig::default(),
        );
        Self {
            store,
            remote,
            session,
            connectivity,
            recorder,
            engine,
        }
    }
}

/// Leaves the store's connection mutex poisoned, so every later call fails.
pub fn poison_store(store: &Arc<LocalStore>) {
    let store = store.clone();
    let _ = std::thread::spawn(move || {
        let _ = store.transaction::<()>(|_| panic!("poisoning store lock"));
    })
    .join();
}

pub fn owner_id(id: &str) -> OwnerId {
    OwnerId::new(id).unwrap()
}

pub fn trip_draft(name: &str) -> TripDraft {
    TripDraft::new(name)
}

pub fn item_draft(name: &str) -> ItemDraft {
    ItemDraft::new(name)
}

/// Opt-in log output: `RUST_LOG=wayfare_sync=debug cargo test`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
