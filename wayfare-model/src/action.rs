//! Pending actions: the durable record of a mutation not yet confirmed by
//! the server.
//!
//! [`Action`] is the typed form used by code that records or replays writes.
//! [`PendingAction`] is what the ledger stores: the type is kept as a plain
//! string and the payload as raw JSON, so an entry written by a newer or
//! older client still loads and can be evicted instead of wedging the queue.

use crate::entity::{ItemUpdate, NewItem, NewTrip, TripUpdate};
use crate::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use wayfare_types::{ActionId, HybridTimestamp, ItemId, TripId};

/// The kinds of mutation the remote API accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateTrip,
    UpdateTrip,
    DeleteTrip,
    CreateItem,
    UpdateItem,
    DeleteItem,
    TogglePurchased,
}

impl ActionType {
    pub const ALL: [ActionType; 7] = [
        ActionType::CreateTrip,
        ActionType::UpdateTrip,
        ActionType::DeleteTrip,
        ActionType::CreateItem,
        ActionType::UpdateItem,
        ActionType::DeleteItem,
        ActionType::TogglePurchased,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::CreateTrip => "create_trip",
            ActionType::UpdateTrip => "update_trip",
            ActionType::DeleteTrip => "delete_trip",
            ActionType::CreateItem => "create_item",
            ActionType::UpdateItem => "update_item",
            ActionType::DeleteItem => "delete_item",
            ActionType::TogglePurchased => "toggle_purchased",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ModelError::UnknownActionType(s.to_string()))
    }
}

/// The entity an action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Trip(TripId),
    Item(ItemId),
}

impl EntityRef {
    /// The key the entity is stored under; also the ledger's `entity_key`.
    pub fn key(&self) -> String {
        match self {
            EntityRef::Trip(id) => id.to_string(),
            EntityRef::Item(id) => id.to_string(),
        }
    }
}

/// One mutating RPC call, with exactly the parameters needed to replay it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Action {
    CreateTrip(NewTrip),
    UpdateTrip(TripUpdate),
    DeleteTrip { id: TripId },
    CreateItem(NewItem),
    UpdateItem(ItemUpdate),
    DeleteItem { id: ItemId },
    TogglePurchased { id: ItemId, purchased: bool },
}

impl Action {
    pub fn action_type(&self) -> ActionType {
        match self {
            Action::CreateTrip(_) => ActionType::CreateTrip,
            Action::UpdateTrip(_) => ActionType::UpdateTrip,
            Action::DeleteTrip { .. } => ActionType::DeleteTrip,
            Action::CreateItem(_) => ActionType::CreateItem,
            Action::UpdateItem(_) => ActionType::UpdateItem,
            Action::DeleteItem { .. } => ActionType::DeleteItem,
            Action::TogglePurchased { .. } => ActionType::TogglePurchased,
        }
    }

    pub fn entity(&self) -> EntityRef {
        match self {
            Action::CreateTrip(new) => EntityRef::Trip(new.id),
            Action::UpdateTrip(update) => EntityRef::Trip(update.id),
            Action::DeleteTrip { id } => EntityRef::Trip(*id),
            Action::CreateItem(new) => EntityRef::Item(new.id),
            Action::UpdateItem(update) => EntityRef::Item(update.id),
            Action::DeleteItem { id } => EntityRef::Item(*id),
            Action::TogglePurchased { id, .. } => EntityRef::Item(*id),
        }
    }

    /// Whether a confirmed replay leaves a local record to mark as synced.
    pub fn marks_synced(&self) -> bool {
        !matches!(self, Action::DeleteTrip { .. } | Action::DeleteItem { .. })
    }

    /// The payload alone, as stored in the ledger.
    pub fn payload(&self) -> ModelResult<serde_json::Value> {
        let mut tagged = serde_json::to_value(self)?;
        Ok(tagged
            .get_mut("payload")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }
}

/// A ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: ActionId,
    #[serde(rename = "type")]
    pub action_type: String,
    pub payload: serde_json::Value,
    /// Recording order; the only ordering key of the ledger.
    pub timestamp: HybridTimestamp,
    pub retries: u32,
    /// Key of the targeted entity, for per-entity lookups.
    pub entity_key: String,
}

impl PendingAction {
    /// Wraps an action recorded at `timestamp`.
    pub fn new(action: &Action, timestamp: HybridTimestamp) -> ModelResult<Self> {
        Ok(Self {
            id: ActionId::new(),
            action_type: action.action_type().as_str().to_string(),
            payload: action.payload()?,
            timestamp,
            retries: 0,
            entity_key: action.entity().key(),
        })
    }

    /// The declared type, if it is one this build knows.
    pub fn kind(&self) -> Option<ActionType> {
        self.action_type.parse().ok()
    }

    /// Rebuilds the typed action for replay.
    pub fn decode(&self) -> ModelResult<Action> {
        let kind: ActionType = self.action_type.parse()?;
        let tagged = serde_json::json!({
            "type": kind.as_str(),
            "payload": self.payload,
        });
        serde_json::from_value(tagged).map_err(|source| ModelError::MalformedPayload {
            action_type: self.action_type.clone(),
            source,
        })
    }
}

/// Why an action was evicted from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Every allowed attempt failed with a retryable error.
    RetriesExhausted,
    /// The server refused the action in a way retrying cannot fix.
    Rejected,
    /// The entry's type or payload cannot be replayed by this client.
    Undecodable,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::RetriesExhausted => "retries_exhausted",
            FailureReason::Rejected => "rejected",
            FailureReason::Undecodable => "undecodable",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureReason {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retries_exhausted" => Ok(FailureReason::RetriesExhausted),
            "rejected" => Ok(FailureReason::Rejected),
            "undecodable" => Ok(FailureReason::Undecodable),
            other => Err(ModelError::Validation(format!("unknown failure reason: {other}"))),
        }
    }
}

/// An evicted action, kept so the user can be told their write was lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedAction {
    pub action: PendingAction,
    pub reason: FailureReason,
    /// Last error reported for the action.
    pub message: String,
    pub failed_at: i64,
}

impl FailedAction {
    pub fn new(action: PendingAction, reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            action,
            reason,
            message: message.into(),
            failed_at: crate::now_millis(),
        }
    }
}
