//! Collections, secondary indexes, and the trait tying model types to them.

use rusqlite::ToSql;
use rusqlite::types::ToSqlOutput;
use serde::Serialize;
use serde::de::DeserializeOwned;
use wayfare_model::{Item, Trip};
use wayfare_types::{ItemId, OwnerId, TripId};

/// A named record collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Trips,
    Items,
}

impl Collection {
    /// Backing table name.
    pub const fn table(&self) -> &'static str {
        match self {
            Collection::Trips => "trips",
            Collection::Items => "items",
        }
    }
}

/// Secondary indexes available on every collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Index {
    /// Records belonging to one owner.
    Owner,
    /// Children of a parent record (items of a trip).
    Parent,
    /// Unique trip slug.
    Slug,
    /// Records by `synced` flag.
    SyncStatus,
}

impl Index {
    pub(crate) const fn column(&self) -> &'static str {
        match self {
            Index::Owner => "owner_id",
            Index::Parent => "parent_id",
            Index::Slug => "slug",
            Index::SyncStatus => "synced",
        }
    }
}

/// A value to look up in an [`Index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexValue {
    Text(String),
    Flag(bool),
}

impl ToSql for IndexValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            IndexValue::Text(s) => s.to_sql(),
            IndexValue::Flag(b) => Ok(ToSqlOutput::from(i64::from(*b))),
        }
    }
}

impl From<&str> for IndexValue {
    fn from(s: &str) -> Self {
        IndexValue::Text(s.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(s: String) -> Self {
        IndexValue::Text(s)
    }
}

impl From<bool> for IndexValue {
    fn from(b: bool) -> Self {
        IndexValue::Flag(b)
    }
}

impl From<TripId> for IndexValue {
    fn from(id: TripId) -> Self {
        IndexValue::Text(id.to_string())
    }
}

impl From<ItemId> for IndexValue {
    fn from(id: ItemId) -> Self {
        IndexValue::Text(id.to_string())
    }
}

impl From<&OwnerId> for IndexValue {
    fn from(owner: &OwnerId) -> Self {
        IndexValue::Text(owner.to_string())
    }
}

/// Values extracted from a record into indexed columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexedColumns {
    pub owner: Option<String>,
    pub parent: Option<String>,
    pub slug: Option<String>,
    pub synced: bool,
}

/// A type stored in one of the [`Collection`]s.
///
/// The full record is kept as JSON; [`Record::indexed`] pulls out the values
/// the secondary indexes are built on.
pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    /// Primary key.
    fn key(&self) -> String;

    fn indexed(&self) -> IndexedColumns;

    fn set_synced(&mut self, synced: bool);

    fn set_owner(&mut self, owner: OwnerId);
}

impl Record for Trip {
    const COLLECTION: Collection = Collection::Trips;

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn indexed(&self) -> IndexedColumns {
        IndexedColumns {
            owner: Some(self.owner_id.to_string()),
            parent: None,
            slug: Some(self.slug.clone()),
            synced: self.synced,
        }
    }

    fn set_synced(&mut self, synced: bool) {
        self.synced = synced;
    }

    fn set_owner(&mut self, owner: OwnerId) {
        self.owner_id = owner;
    }
}

impl Record for Item {
    const COLLECTION: Collection = Collection::Items;

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn indexed(&self) -> IndexedColumns {
        IndexedColumns {
            owner: Some(self.owner_id.to_string()),
            parent: Some(self.trip_id.to_string()),
            slug: None,
            synced: self.synced,
        }
    }

    fn set_synced(&mut self, synced: bool) {
        self.synced = synced;
    }

    fn set_owner(&mut self, owner: OwnerId) {
        self.owner_id = owner;
    }
}
