//! HTTP mutation API for Wayfare trips and items.
//!
//! An in-memory reference server for the surface the sync engine replays
//! against. Every mutation is keyed by the client-generated id, so replaying
//! the same call twice leaves the same state and returns the same answer.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};
use wayfare_model::{
    ActionResult, Item, ItemPatch, NewItem, NewTrip, Trip, TripPatch, now_millis,
};
use wayfare_types::{ItemId, TripId};

/// Body of `POST /api/v1/items/{id}/purchased`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PurchasedBody {
    pub purchased: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub trips: usize,
    pub items: usize,
}

#[derive(Debug, Default)]
struct Records {
    trips: HashMap<TripId, Trip>,
    items: HashMap<ItemId, Item>,
    deleted_trips: HashSet<TripId>,
    deleted_items: HashSet<ItemId>,
}

impl Records {
    fn slug_owner(&self, slug: &str) -> Option<TripId> {
        self.trips.values().find(|t| t.slug == slug).map(|t| t.id)
    }

    fn remove_trip(&mut self, id: TripId) {
        self.trips.remove(&id);
        self.deleted_trips.insert(id);
        let children: Vec<ItemId> = self
            .items
            .values()
            .filter(|i| i.trip_id == id)
            .map(|i| i.id)
            .collect();
        for item in children {
            self.items.remove(&item);
            self.deleted_items.insert(item);
        }
    }
}

/// Shared server state. Clones share the same records.
#[derive(Clone, Default)]
pub struct AppState {
    records: Arc<RwLock<Records>>,
    /// Mutating requests still to be answered with 503.
    outage: Arc<AtomicU32>,
    mutations: Arc<AtomicU64>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers the next `count` mutating requests with 503 Service Unavailable.
    pub fn fail_next(&self, count: u32) {
        self.outage.store(count, Ordering::SeqCst);
    }

    /// Mutating requests received, including failed ones.
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    pub async fn trip(&self, id: TripId) -> Option<Trip> {
        self.records.read().await.trips.get(&id).cloned()
    }

    pub async fn item(&self, id: ItemId) -> Option<Item> {
        self.records.read().await.items.get(&id).cloned()
    }

    pub async fn trips(&self) -> Vec<Trip> {
        let mut trips: Vec<Trip> = self.records.read().await.trips.values().cloned().collect();
        trips.sort_by_key(|t| t.id);
        trips
    }

    pub async fn items_of(&self, trip_id: TripId) -> Vec<Item> {
        let mut items: Vec<Item> = self
            .records
            .read()
            .await
            .items
            .values()
            .filter(|i| i.trip_id == trip_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.id);
        items
    }

    /// Counts the request; returns a 503 while an outage is scheduled.
    fn admit(&self) -> Option<Response> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .outage
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        failing.then(|| {
            debug!("injected outage");
            reply::<()>(
                StatusCode::SERVICE_UNAVAILABLE,
                ActionResult::failed("service unavailable"),
            )
        })
    }
}

fn reply<T: Serialize>(status: StatusCode, result: ActionResult<T>) -> Response {
    (status, Json(result)).into_response()
}

fn rejected(status: StatusCode, message: impl Into<String>) -> Response {
    reply::<()>(status, ActionResult::rejected(message))
}

// ── Trips ────────────────────────────────────────────────────────

async fn create_trip(State(state): State<AppState>, Json(new): Json<NewTrip>) -> Response {
    if let Some(outage) = state.admit() {
        return outage;
    }
    if new.name.trim().is_empty() {
        return rejected(StatusCode::UNPROCESSABLE_ENTITY, "trip name is required");
    }

    let mut records = state.records.write().await;
    if let Some(existing) = records.trips.get(&new.id) {
        debug!(trip_id = %new.id, "trip already exists; replay");
        return reply(StatusCode::OK, ActionResult::ok(existing.clone()));
    }
    if records.deleted_trips.contains(&new.id) {
        return rejected(StatusCode::CONFLICT, format!("trip {} was deleted", new.id));
    }
    if records.slug_owner(&new.slug).is_some() {
        return rejected(
            StatusCode::CONFLICT,
            format!("slug {} is already taken", new.slug),
        );
    }

    let mut trip = Trip::from_new(&new, now_millis());
    trip.synced = true;
    records.trips.insert(trip.id, trip.clone());
    info!(trip_id = %trip.id, slug = %trip.slug, "trip created");
    reply(StatusCode::CREATED, ActionResult::ok(trip))
}

async fn get_trip(State(state): State<AppState>, Path(id): Path<TripId>) -> Response {
    match state.trip(id).await {
        Some(trip) => reply(StatusCode::OK, ActionResult::ok(trip)),
        None => rejected(StatusCode::NOT_FOUND, format!("trip {id} not found")),
    }
}

async fn update_trip(
    State(state): State<AppState>,
    Path(id): Path<TripId>,
    Json(patch): Json<TripPatch>,
) -> Response {
    if let Some(outage) = state.admit() {
        return outage;
    }
    if let Err(e) = patch.validate() {
        return rejected(StatusCode::UNPROCESSABLE_ENTITY, e.to_string());
    }

    let mut records = state.records.write().await;
    let Some(trip) = records.trips.get_mut(&id) else {
        return rejected(StatusCode::NOT_FOUND, format!("trip {id} not found"));
    };
    trip.apply(&patch, now_millis());
    info!(trip_id = %id, "trip updated");
    reply(StatusCode::OK, ActionResult::ok(trip.clone()))
}

async fn delete_trip(State(state): State<AppState>, Path(id): Path<TripId>) -> Response {
    if let Some(outage) = state.admit() {
        return outage;
    }

    let mut records = state.records.write().await;
    if records.trips.contains_key(&id) {
        records.remove_trip(id);
        info!(trip_id = %id, "trip deleted");
    } else if !records.deleted_trips.contains(&id) {
        return rejected(StatusCode::NOT_FOUND, format!("trip {id} not found"));
    }
    reply::<()>(StatusCode::OK, ActionResult::ok_with_message((), "deleted"))
}

// ── Items ────────────────────────────────────────────────────────

async fn create_item(
    State(state): State<AppState>,
    Path(trip_id): Path<TripId>,
    Json(new): Json<NewItem>,
) -> Response {
    if let Some(outage) = state.admit() {
        return outage;
    }
    if new.trip_id != trip_id {
        return rejected(StatusCode::BAD_REQUEST, "item trip_id does not match the route");
    }
    if new.name.trim().is_empty() || new.quantity == 0 {
        return rejected(
            StatusCode::UNPROCESSABLE_ENTITY,
            "item needs a name and a positive quantity",
        );
    }

    let mut records = state.records.write().await;
    if let Some(existing) = records.items.get(&new.id) {
        debug!(item_id = %new.id, "item already exists; replay");
        return reply(StatusCode::OK, ActionResult::ok(existing.clone()));
    }
    if records.deleted_items.contains(&new.id) {
        return rejected(StatusCode::CONFLICT, format!("item {} was deleted", new.id));
    }
    if !records.trips.contains_key(&trip_id) {
        return rejected(StatusCode::NOT_FOUND, format!("trip {trip_id} not found"));
    }

    let mut item = Item::from_new(&new, now_millis());
    item.synced = true;
    records.items.insert(item.id, item.clone());
    info!(item_id = %item.id, %trip_id, "item created");
    reply(StatusCode::CREATED, ActionResult::ok(item))
}

async fn list_items(State(state): State<AppState>, Path(trip_id): Path<TripId>) -> Response {
    if state.trip(trip_id).await.is_none() {
        return rejected(StatusCode::NOT_FOUND, format!("trip {trip_id} not found"));
    }
    reply(StatusCode::OK, ActionResult::ok(state.items_of(trip_id).await))
}

async fn get_item(State(state): State<AppState>, Path(id): Path<ItemId>) -> Response {
    match state.item(id).await {
        Some(item) => reply(StatusCode::OK, ActionResult::ok(item)),
        None => rejected(StatusCode::NOT_FOUND, format!("item {id} not found")),
    }
}

async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<ItemId>,
    Json(patch): Json<ItemPatch>,
) -> Response {
    if let Some(outage) = state.admit() {
        return outage;
    }
    if let Err(e) = patch.validate() {
        return rejected(StatusCode::UNPROCESSABLE_ENTITY, e.to_string());
    }

    let mut records = state.records.write().await;
    let Some(item) = records.items.get_mut(&id) else {
        return rejected(StatusCode::NOT_FOUND, format!("item {id} not found"));
    };
    item.apply(&patch, now_millis());
    info!(item_id = %id, "item updated");
    reply(StatusCode::OK, ActionResult::ok(item.clone()))
}

async fn delete_item(State(state): State<AppState>, Path(id): Path<ItemId>) -> Response {
    if let Some(outage) = state.admit() {
        return outage;
    }

    let mut records = state.records.write().await;
    if records.items.remove(&id).is_some() {
        records.deleted_items.insert(id);
        info!(item_id = %id, "item deleted");
    } else if !records.deleted_items.contains(&id) {
        return rejected(StatusCode::NOT_FOUND, format!("item {id} not found"));
    }
    reply::<()>(StatusCode::OK, ActionResult::ok_with_message((), "deleted"))
}

async fn toggle_purchased(
    State(state): State<AppState>,
    Path(id): Path<ItemId>,
    Json(body): Json<PurchasedBody>,
) -> Response {
    if let Some(outage) = state.admit() {
        return outage;
    }

    let mut records = state.records.write().await;
    let Some(item) = records.items.get_mut(&id) else {
        return rejected(StatusCode::NOT_FOUND, format!("item {id} not found"));
    };
    item.purchased = body.purchased;
    item.updated_at = now_millis();
    info!(item_id = %id, purchased = body.purchased, "item purchased flag set");
    reply(StatusCode::OK, ActionResult::ok(item.clone()))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let records = state.records.read().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        trips: records.trips.len(),
        items: records.items.len(),
    })
}

/// Build the HTTP API router over the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/trips", post(create_trip))
        .route(
            "/api/v1/trips/{id}",
            get(get_trip).patch(update_trip).delete(delete_trip),
        )
        .route("/api/v1/trips/{id}/items", post(create_item).get(list_items))
        .route(
            "/api/v1/items/{id}",
            get(get_item).patch(update_item).delete(delete_item),
        )
        .route("/api/v1/items/{id}/purchased", post(toggle_purchased))
        .with_state(state)
}
