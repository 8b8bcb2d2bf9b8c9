//! SQLite storage layer for Wayfare.
//!
//! One database file holds everything the client needs to work offline:
//!
//! - `trips` and `items` collections, stored as JSON with indexed columns
//!   for owner, parent, slug and sync status
//! - `pending_actions`, the ordered ledger of writes not yet confirmed by
//!   the server
//! - `failed_actions`, entries evicted from the ledger and kept until the
//!   user dismisses them
//!
//! The schema is versioned through `PRAGMA user_version` and upgraded when
//! the store is opened.

mod error;
mod record;
mod schema;
mod store;

pub use error::{StorageError, StorageResult};
pub use record::{Collection, Index, IndexValue, IndexedColumns, Record};
pub use schema::SCHEMA_VERSION;
pub use store::{LocalStore, StoreTx};
