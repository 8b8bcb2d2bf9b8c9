//! Domain model for Wayfare's offline-first core.
//!
//! Defines the types every other crate depends on:
//! - [`Trip`] and [`Item`]: client mirrors of server records, with a `synced` flag
//! - Drafts and patches: what a user submits when creating or editing
//! - [`Action`]: the typed replay payload of one mutating RPC
//! - [`PendingAction`]: a durable ledger entry wrapping an action
//! - [`FailedAction`]: the record left behind when a ledger entry is evicted
//! - [`ActionResult`]: the `{success, data?, message?}` remote contract

mod action;
mod entity;
mod result;

pub use action::{Action, ActionType, EntityRef, FailedAction, FailureReason, PendingAction};
pub use entity::{
    Item, ItemDraft, ItemPatch, ItemUpdate, NewItem, NewTrip, Trip, TripDraft, TripPatch,
    TripUpdate,
};
pub use result::ActionResult;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while validating input or decoding ledger entries.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A ledger entry names a type no handler knows about.
    #[error("unknown action type: {0}")]
    UnknownActionType(String),

    /// A ledger payload does not match its declared type.
    #[error("malformed payload for {action_type}: {source}")]
    MalformedPayload {
        action_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// User input rejected before any write happens.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Milliseconds since the Unix epoch, the unit of every `*_at` field.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
