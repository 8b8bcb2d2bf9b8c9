use std::collections::HashSet;
use std::str::FromStr;
use wayfare_types::{ActionId, ItemId, OwnerId, TripId};

// ── Uuid ids ──────────────────────────────────────────────────────

#[test]
fn trip_id_new_is_unique() {
    let ids: HashSet<TripId> = (0..100).map(|_| TripId::new()).collect();
    assert_eq!(ids.len(), 100);
}

#[test]
fn trip_id_display_and_parse() {
    let id = TripId::new();
    let parsed = TripId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn item_id_from_str() {
    let id = ItemId::new();
    let parsed = ItemId::from_str(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn action_id_parse_invalid() {
    assert!(matches!(
        ActionId::parse("not-a-uuid"),
        Err(wayfare_types::Error::InvalidUuid(_))
    ));
}

#[test]
fn ids_are_time_ordered() {
    let a = ActionId::new();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let b = ActionId::new();
    assert!(a < b);
}

#[test]
fn ids_serialize_as_plain_strings() {
    let id = TripId::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
}

// ── OwnerId ──────────────────────────────────────────────────────

#[test]
fn owner_id_rejects_empty() {
    assert!(OwnerId::new("").is_err());
    assert!(OwnerId::new("   ").is_err());
}

#[test]
fn owner_id_keeps_value() {
    let owner = OwnerId::new("user_42").unwrap();
    assert_eq!(owner.as_str(), "user_42");
    assert!(!owner.is_offline_sentinel());
}

#[test]
fn offline_sentinel_is_recognized() {
    let owner = OwnerId::offline_sentinel();
    assert_eq!(owner.as_str(), "offline-user");
    assert!(owner.is_offline_sentinel());
    assert_eq!(OwnerId::from_str("offline-user").unwrap(), owner);
}
