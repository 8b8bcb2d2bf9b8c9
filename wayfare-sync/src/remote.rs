//! The remote mutation API the engine replays against.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use wayfare_model::{
    Action, ActionResult, Item, ItemUpdate, NewItem, NewTrip, Trip, TripUpdate,
};
use wayfare_types::{ItemId, TripId};

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// A remote call that did not produce an [`ActionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Connection refused, reset, DNS failure.
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    /// Non-success status without a usable result body.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The response body was not a valid result.
    #[error("invalid response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether trying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Network(_) | RemoteError::Timeout => true,
            RemoteError::Http { status, .. } => is_retryable_status(*status),
            RemoteError::Decode(_) => false,
        }
    }
}

/// 408, 429 and every 5xx.
pub fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

/// One method per mutating RPC. Implementations must be idempotent on the
/// client-generated id: replaying a create for an id that already exists
/// returns the existing record.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn create_trip(&self, trip: &NewTrip) -> RemoteResult<ActionResult<Trip>>;

    async fn update_trip(&self, update: &TripUpdate) -> RemoteResult<ActionResult<Trip>>;

    async fn delete_trip(&self, id: TripId) -> RemoteResult<ActionResult<()>>;

    async fn create_item(&self, item: &NewItem) -> RemoteResult<ActionResult<Item>>;

    async fn update_item(&self, update: &ItemUpdate) -> RemoteResult<ActionResult<Item>>;

    async fn delete_item(&self, id: ItemId) -> RemoteResult<ActionResult<()>>;

    async fn toggle_purchased(
        &self,
        id: ItemId,
        purchased: bool,
    ) -> RemoteResult<ActionResult<Item>>;
}

/// Sends `action` to the matching [`RemoteApi`] method.
pub async fn dispatch(
    remote: &dyn RemoteApi,
    action: &Action,
) -> RemoteResult<ActionResult<Value>> {
    let result = match action {
        Action::CreateTrip(new) => remote.create_trip(new).await?.into_json(),
        Action::UpdateTrip(update) => remote.update_trip(update).await?.into_json(),
        Action::DeleteTrip { id } => remote.delete_trip(*id).await?.into_json(),
        Action::CreateItem(new) => remote.create_item(new).await?.into_json(),
        Action::UpdateItem(update) => remote.update_item(update).await?.into_json(),
        Action::DeleteItem { id } => remote.delete_item(*id).await?.into_json(),
        Action::TogglePurchased { id, purchased } => {
            remote.toggle_purchased(*id, *purchased).await?.into_json()
        }
    };
    result.map_err(|e| RemoteError::Decode(format!("cannot encode result data: {e}")))
}
