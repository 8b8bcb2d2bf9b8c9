use pretty_assertions::assert_eq;
use serde_json::json;
use wayfare_model::{
    Action, ActionType, EntityRef, FailedAction, FailureReason, ItemDraft, ItemPatch, ItemUpdate,
    ModelError, PendingAction, TripDraft,
};
use wayfare_types::{HybridTimestamp, ItemId, OwnerId, TripId};

fn owner() -> OwnerId {
    OwnerId::new("user-1").unwrap()
}

// ── ActionType ───────────────────────────────────────────────────

#[test]
fn action_type_names_match_ledger_format() {
    let names: Vec<&str> = ActionType::ALL.iter().map(|t| t.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "create_trip",
            "update_trip",
            "delete_trip",
            "create_item",
            "update_item",
            "delete_item",
            "toggle_purchased",
        ]
    );
}

#[test]
fn action_type_parse_roundtrip() {
    for t in ActionType::ALL {
        assert_eq!(t.as_str().parse::<ActionType>().unwrap(), t);
    }
}

#[test]
fn action_type_parse_unknown() {
    let err = "archive_trip".parse::<ActionType>().unwrap_err();
    assert!(matches!(err, ModelError::UnknownActionType(t) if t == "archive_trip"));
}

// ── Action ───────────────────────────────────────────────────────

#[test]
fn create_trip_payload_carries_client_id_and_slug() {
    let id = TripId::new();
    let new = TripDraft::new("Tokyo 2025").into_new(id, owner());
    let action = Action::CreateTrip(new.clone());

    let payload = action.payload().unwrap();
    assert_eq!(payload["id"], json!(id.to_string()));
    assert_eq!(payload["slug"], json!(new.slug));
    assert_eq!(payload["name"], json!("Tokyo 2025"));
}

#[test]
fn toggle_payload_is_minimal() {
    let id = ItemId::new();
    let action = Action::TogglePurchased { id, purchased: true };
    assert_eq!(
        action.payload().unwrap(),
        json!({ "id": id.to_string(), "purchased": true })
    );
}

#[test]
fn update_payload_flattens_patch_and_omits_unset_fields() {
    let id = ItemId::new();
    let action = Action::UpdateItem(ItemUpdate {
        id,
        patch: ItemPatch {
            quantity: Some(4),
            ..Default::default()
        },
    });
    assert_eq!(
        action.payload().unwrap(),
        json!({ "id": id.to_string(), "quantity": 4 })
    );
}

#[test]
fn entity_ref_and_sync_marking() {
    let trip_id = TripId::new();
    let item_id = ItemId::new();

    assert_eq!(Action::DeleteTrip { id: trip_id }.entity(), EntityRef::Trip(trip_id));
    assert_eq!(
        Action::TogglePurchased { id: item_id, purchased: false }.entity(),
        EntityRef::Item(item_id)
    );
    assert!(!Action::DeleteItem { id: item_id }.marks_synced());
    assert!(Action::TogglePurchased { id: item_id, purchased: true }.marks_synced());
}

// ── PendingAction ────────────────────────────────────────────────

#[test]
fn pending_action_starts_with_zero_retries() {
    let item = ItemDraft::new("Tent").into_new(ItemId::new(), TripId::new(), owner());
    let action = Action::CreateItem(item.clone());
    let pending = PendingAction::new(&action, HybridTimestamp::new(10, 0)).unwrap();

    assert_eq!(pending.retries, 0);
    assert_eq!(pending.action_type, "create_item");
    assert_eq!(pending.entity_key, item.id.to_string());
    assert_eq!(pending.kind(), Some(ActionType::CreateItem));
}

#[test]
fn pending_action_decode_returns_original_action() {
    let action = Action::DeleteTrip { id: TripId::new() };
    let pending = PendingAction::new(&action, HybridTimestamp::now()).unwrap();
    assert_eq!(pending.decode().unwrap(), action);
}

#[test]
fn pending_action_ids_are_not_entity_ids() {
    let id = TripId::new();
    let pending = PendingAction::new(&Action::DeleteTrip { id }, HybridTimestamp::now()).unwrap();
    assert_ne!(pending.id.to_string(), id.to_string());
}

#[test]
fn decode_unknown_type_fails() {
    let mut pending =
        PendingAction::new(&Action::DeleteTrip { id: TripId::new() }, HybridTimestamp::now())
            .unwrap();
    pending.action_type = "share_trip".into();

    assert_eq!(pending.kind(), None);
    assert!(matches!(pending.decode(), Err(ModelError::UnknownActionType(_))));
}

#[test]
fn decode_malformed_payload_fails() {
    let mut pending =
        PendingAction::new(&Action::DeleteTrip { id: TripId::new() }, HybridTimestamp::now())
            .unwrap();
    pending.payload = json!({ "id": 42 });

    assert!(matches!(
        pending.decode(),
        Err(ModelError::MalformedPayload { .. })
    ));
}

#[test]
fn pending_action_serializes_type_field() {
    let pending =
        PendingAction::new(&Action::DeleteItem { id: ItemId::new() }, HybridTimestamp::new(1, 2))
            .unwrap();
    let json = serde_json::to_value(&pending).unwrap();
    assert_eq!(json["type"], json!("delete_item"));
    assert_eq!(json["retries"], json!(0));
}

// ── FailedAction ─────────────────────────────────────────────────

#[test]
fn failure_reason_parse_roundtrip() {
    for reason in [
        FailureReason::RetriesExhausted,
        FailureReason::Rejected,
        FailureReason::Undecodable,
    ] {
        assert_eq!(reason.as_str().parse::<FailureReason>().unwrap(), reason);
    }
}

#[test]
fn failed_action_keeps_the_original_entry() {
    let pending =
        PendingAction::new(&Action::DeleteItem { id: ItemId::new() }, HybridTimestamp::now())
            .unwrap();
    let failed = FailedAction::new(pending.clone(), FailureReason::Rejected, "item not found");

    assert_eq!(failed.action, pending);
    assert_eq!(failed.message, "item not found");
    assert!(failed.failed_at > 0);
}
