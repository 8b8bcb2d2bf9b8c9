use serde_json::{Value, json};
use wayfare_model::{ActionResult, Item, ItemDraft, NewTrip, Trip, TripDraft};
use wayfare_server::{AppState, HealthResponse, build_router};
use wayfare_types::{ItemId, OwnerId, TripId};

/// Spin up the HTTP server on an OS-assigned port, returning the base URL.
async fn spawn_test_server(state: AppState) -> String {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}/api/v1", port)
}

fn owner() -> OwnerId {
    OwnerId::new("user-1").unwrap()
}

fn new_trip(name: &str) -> NewTrip {
    TripDraft::new(name).into_new(TripId::new(), owner())
}

async fn create(client: &reqwest::Client, base: &str, trip: &NewTrip) -> reqwest::Response {
    client
        .post(format!("{base}/trips"))
        .json(trip)
        .send()
        .await
        .unwrap()
}

// ── Trips ────────────────────────────────────────────────────────

#[tokio::test]
async fn create_trip_returns_created_record() {
    let base = spawn_test_server(AppState::new()).await;
    let client = reqwest::Client::new();
    let trip = new_trip("Tokyo 2025");

    let resp = create(&client, &base, &trip).await;
    assert_eq!(resp.status(), 201);
    let body: ActionResult<Trip> = resp.json().await.unwrap();
    assert!(body.success);
    let created = body.data.unwrap();
    assert_eq!(created.id, trip.id);
    assert_eq!(created.slug, trip.slug);
    assert_eq!(created.owner_id, owner());
}

#[tokio::test]
async fn create_trip_is_idempotent_on_id() {
    let state = AppState::new();
    let base = spawn_test_server(state.clone()).await;
    let client = reqwest::Client::new();
    let trip = new_trip("Tokyo 2025");

    let first: ActionResult<Trip> = create(&client, &base, &trip).await.json().await.unwrap();
    let resp = create(&client, &base, &trip).await;
    assert_eq!(resp.status(), 200);
    let second: ActionResult<Trip> = resp.json().await.unwrap();

    assert!(second.success);
    assert_eq!(first.data, second.data);
    assert_eq!(state.trips().await.len(), 1);
}

#[tokio::test]
async fn slug_taken_by_other_trip_is_permanent_rejection() {
    let base = spawn_test_server(AppState::new()).await;
    let client = reqwest::Client::new();
    let first = new_trip("Tokyo");
    let mut second = new_trip("Tokyo");
    second.slug = first.slug.clone();

    create(&client, &base, &first).await;
    let resp = create(&client, &base, &second).await;
    assert_eq!(resp.status(), 409);
    let body: ActionResult<Value> = resp.json().await.unwrap();
    assert!(!body.success);
    assert_eq!(body.retryable, Some(false));
    assert!(body.message.unwrap().contains("already taken"));
}

#[tokio::test]
async fn update_trip_applies_patch() {
    let base = spawn_test_server(AppState::new()).await;
    let client = reqwest::Client::new();
    let trip = new_trip("Tokyo");
    create(&client, &base, &trip).await;

    let resp = client
        .patch(format!("{base}/trips/{}", trip.id))
        .json(&json!({"name": "Kyoto", "destination": "Japan"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: ActionResult<Trip> = resp.json().await.unwrap();
    let updated = body.data.unwrap();
    assert_eq!(updated.name, "Kyoto");
    assert_eq!(updated.destination.as_deref(), Some("Japan"));
    assert_eq!(updated.slug, trip.slug);
}

#[tokio::test]
async fn update_unknown_trip_is_404_with_body() {
    let base = spawn_test_server(AppState::new()).await;
    let resp = reqwest::Client::new()
        .patch(format!("{base}/trips/{}", TripId::new()))
        .json(&json!({"name": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: ActionResult<Value> = resp.json().await.unwrap();
    assert!(body.is_permanent_failure());
}

#[tokio::test]
async fn delete_trip_twice_succeeds_and_removes_items() {
    let state = AppState::new();
    let base = spawn_test_server(state.clone()).await;
    let client = reqwest::Client::new();
    let trip = new_trip("Tokyo");
    create(&client, &base, &trip).await;
    let item = ItemDraft::new("Rail pass").into_new(ItemId::new(), trip.id, owner());
    client
        .post(format!("{base}/trips/{}/items", trip.id))
        .json(&item)
        .send()
        .await
        .unwrap();

    for _ in 0..2 {
        let resp = client
            .delete(format!("{base}/trips/{}", trip.id))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: ActionResult<Value> = resp.json().await.unwrap();
        assert!(body.success);
    }
    assert!(state.trip(trip.id).await.is_none());
    assert!(state.item(item.id).await.is_none());
}

#[tokio::test]
async fn delete_unknown_trip_is_404() {
    let base = spawn_test_server(AppState::new()).await;
    let resp = reqwest::Client::new()
        .delete(format!("{base}/trips/{}", TripId::new()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

// ── Items ────────────────────────────────────────────────────────

#[tokio::test]
async fn item_lifecycle() {
    let state = AppState::new();
    let base = spawn_test_server(state.clone()).await;
    let client = reqwest::Client::new();
    let trip = new_trip("Tokyo");
    create(&client, &base, &trip).await;

    let item = ItemDraft::new("Umbrella")
        .with_quantity(2)
        .into_new(ItemId::new(), trip.id, owner());
    let resp = client
        .post(format!("{base}/trips/{}/items", trip.id))
        .json(&item)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = client
        .post(format!("{base}/items/{}/purchased", item.id))
        .json(&json!({"purchased": true}))
        .send()
        .await
        .unwrap();
    let body: ActionResult<Item> = resp.json().await.unwrap();
    assert!(body.data.unwrap().purchased);

    let resp = client
        .patch(format!("{base}/items/{}", item.id))
        .json(&json!({"quantity": 3}))
        .send()
        .await
        .unwrap();
    let body: ActionResult<Item> = resp.json().await.unwrap();
    assert_eq!(body.data.unwrap().quantity, 3);

    let listed: ActionResult<Vec<Item>> = client
        .get(format!("{base}/trips/{}/items", trip.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.data.unwrap().len(), 1);

    let resp = client
        .delete(format!("{base}/items/{}", item.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(state.items_of(trip.id).await.is_empty());
}

#[tokio::test]
async fn item_for_unknown_trip_is_rejected() {
    let base = spawn_test_server(AppState::new()).await;
    let trip_id = TripId::new();
    let item = ItemDraft::new("Umbrella").into_new(ItemId::new(), trip_id, owner());
    let resp = reqwest::Client::new()
        .post(format!("{base}/trips/{trip_id}/items"))
        .json(&item)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: ActionResult<Value> = resp.json().await.unwrap();
    assert_eq!(body.retryable, Some(false));
}

#[tokio::test]
async fn item_route_must_match_body_trip() {
    let base = spawn_test_server(AppState::new()).await;
    let item = ItemDraft::new("Umbrella").into_new(ItemId::new(), TripId::new(), owner());
    let resp = reqwest::Client::new()
        .post(format!("{base}/trips/{}/items", TripId::new()))
        .json(&item)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

// ── Outage injection ─────────────────────────────────────────────

#[tokio::test]
async fn injected_outage_returns_503_then_recovers() {
    let state = AppState::new();
    let base = spawn_test_server(state.clone()).await;
    let client = reqwest::Client::new();
    let trip = new_trip("Tokyo");
    state.fail_next(2);

    assert_eq!(create(&client, &base, &trip).await.status(), 503);
    assert_eq!(create(&client, &base, &trip).await.status(), 503);
    assert_eq!(create(&client, &base, &trip).await.status(), 201);
    assert_eq!(state.mutation_count(), 3);
}

#[tokio::test]
async fn health_reports_counts() {
    let base = spawn_test_server(AppState::new()).await;
    let client = reqwest::Client::new();
    create(&client, &base, &new_trip("Tokyo")).await;

    let health: HealthResponse = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.trips, 1);
    assert_eq!(health.items, 0);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let base = spawn_test_server(AppState::new()).await;
    let resp = reqwest::get(format!("{base}/nonexistent")).await.unwrap();
    assert_eq!(resp.status(), 404);
}
