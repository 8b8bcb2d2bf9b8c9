mod common;

use common::{Harness, Reply, trip_draft};
use std::time::Duration;
use wayfare_sync::{
    Connectivity, RemoteError, SyncConfig, SyncEngine, SyncError, SyncEvent, SyncOrchestrator,
};

async fn wait_until_empty(h: &Harness) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.store.pending_count().unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("ledger never drained");
}

#[tokio::test]
async fn startup_pass_drains_existing_ledger() {
    let h = Harness::build(Connectivity::Online, None);
    h.recorder
        .record_offline_write(wayfare_model::Action::CreateTrip(
            trip_draft("Tokyo").into_new(
                wayfare_types::TripId::new(),
                wayfare_types::OwnerId::offline_sentinel(),
            ),
        ))
        .await
        .unwrap();

    let handle = SyncOrchestrator::spawn(h.engine.clone(), h.connectivity.clone());
    wait_until_empty(&h).await;
    assert_eq!(h.remote.call_count(), 1);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn startup_pass_can_be_disabled() {
    let h = Harness::offline();
    h.recorder.create_trip(trip_draft("Tokyo")).await.unwrap();
    h.connectivity.set_online(true);

    let engine = SyncEngine::new(
        h.store.clone(),
        h.remote.clone(),
        h.session.clone(),
        SyncConfig {
            sync_on_startup: false,
            ..Default::default()
        },
    );
    let handle = SyncOrchestrator::spawn(engine, h.connectivity.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.remote.call_count(), 0);
    assert_eq!(h.store.pending_count().unwrap(), 1);

    let summary = handle.sync_now().await.unwrap();
    assert_eq!(summary.synced, 1);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn reconnect_triggers_a_pass() {
    let h = Harness::offline();
    let mut events = h.engine.subscribe();
    let handle = SyncOrchestrator::spawn(h.engine.clone(), h.connectivity.clone());

    h.recorder.create_trip(trip_draft("Tokyo")).await.unwrap();
    h.recorder.create_trip(trip_draft("Osaka")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.remote.call_count(), 0);

    h.connectivity.set_online(true);
    let summary = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(SyncEvent::SyncComplete(summary)) = events.recv().await {
                return summary;
            }
        }
    })
    .await
    .expect("no pass after reconnect");

    assert_eq!(summary.synced, 2);
    assert_eq!(h.store.pending_count().unwrap(), 0);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn sync_now_while_offline_is_refused() {
    let h = Harness::offline();
    h.recorder.create_trip(trip_draft("Tokyo")).await.unwrap();
    let handle = SyncOrchestrator::spawn(h.engine.clone(), h.connectivity.clone());

    let err = handle.sync_now().await.unwrap_err();
    assert!(matches!(err, SyncError::Offline));
    assert_eq!(h.remote.call_count(), 0);
    assert_eq!(h.store.pending_count().unwrap(), 1);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn request_sync_runs_in_background() {
    let h = Harness::offline();
    h.recorder.create_trip(trip_draft("Tokyo")).await.unwrap();
    h.connectivity.set_online(true);

    let engine = SyncEngine::new(
        h.store.clone(),
        h.remote.clone(),
        h.session.clone(),
        SyncConfig {
            sync_on_startup: false,
            ..Default::default()
        },
    );
    let handle = SyncOrchestrator::spawn(engine, h.connectivity.clone());
    handle.request_sync().await.unwrap();
    wait_until_empty(&h).await;
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_cancels_engine() {
    let h = Harness::offline();
    let handle = SyncOrchestrator::spawn(h.engine.clone(), h.connectivity.clone());
    let engine = handle.engine().clone();

    handle.shutdown().await.unwrap();
    assert!(engine.is_cancelled());
    assert!(matches!(
        engine.run_sync_pass().await,
        Err(SyncError::Cancelled)
    ));
}

#[tokio::test]
async fn reconnect_during_a_pass_triggers_another() {
    let h = Harness::build(Connectivity::Online, None);
    h.recorder
        .record_offline_write(wayfare_model::Action::CreateTrip(
            trip_draft("Tokyo").into_new(
                wayfare_types::TripId::new(),
                wayfare_types::OwnerId::offline_sentinel(),
            ),
        ))
        .await
        .unwrap();
    h.remote.set_delay(Duration::from_millis(200));
    h.remote
        .script([Reply::Transport(RemoteError::Network("connection reset".into()))]);

    let handle = SyncOrchestrator::spawn(h.engine.clone(), h.connectivity.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.connectivity.set_online(false);
    h.connectivity.set_online(true);

    wait_until_empty(&h).await;
    assert_eq!(h.remote.call_count(), 2);
    handle.shutdown().await.unwrap();
}
