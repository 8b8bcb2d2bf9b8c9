//! Core type definitions for Wayfare.
//!
//! This crate defines the small, storage-agnostic types shared by every
//! other crate in the workspace:
//! - Record and ledger identifiers (UUID v7)
//! - The owner identity, including the offline sentinel
//! - Hybrid Logical Clock timestamps used to order the pending-action ledger
//! - Deterministic trip slug derivation

mod ids;
mod slug;
mod timestamp;

pub use ids::{ActionId, ItemId, OwnerId, TripId};
pub use slug::trip_slug;
pub use timestamp::HybridTimestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid owner id: {0}")]
    InvalidOwner(String),
}
