use crate::{ModelError, ModelResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use wayfare_types::{ItemId, OwnerId, TripId, trip_slug};

/// A trip as mirrored on the client.
///
/// `synced` is false while a locally recorded change to this trip has not
/// been confirmed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub owner_id: OwnerId,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub synced: bool,
}

impl Trip {
    /// Builds the optimistic local record for a create that has not reached
    /// the server yet.
    pub fn from_new(new: &NewTrip, now: i64) -> Self {
        Self {
            id: new.id,
            slug: new.slug.clone(),
            name: new.name.clone(),
            destination: new.destination.clone(),
            start_date: new.start_date,
            end_date: new.end_date,
            owner_id: new.owner_id.clone(),
            created_at: now,
            updated_at: now,
            synced: false,
        }
    }

    /// Applies an edit. The slug is fixed at creation and never follows renames.
    pub fn apply(&mut self, patch: &TripPatch, now: i64) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(destination) = &patch.destination {
            self.destination = Some(destination.clone());
        }
        if let Some(start) = patch.start_date {
            self.start_date = Some(start);
        }
        if let Some(end) = patch.end_date {
            self.end_date = Some(end);
        }
        self.updated_at = now;
    }
}

/// What a user submits to create a trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripDraft {
    pub name: String,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl TripDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    /// Rejects input the server would refuse anyway.
    pub fn validate(&self) -> ModelResult<()> {
        if self.name.trim().is_empty() {
            return Err(ModelError::Validation("trip name must not be empty".into()));
        }
        check_dates(self.start_date, self.end_date)
    }

    /// Fixes the identity of the trip: id, slug and owner.
    pub fn into_new(self, id: TripId, owner_id: OwnerId) -> NewTrip {
        NewTrip {
            id,
            slug: trip_slug(&self.name, &id),
            name: self.name,
            destination: self.destination,
            start_date: self.start_date,
            end_date: self.end_date,
            owner_id,
        }
    }
}

/// Replay payload of `create_trip`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrip {
    pub id: TripId,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub owner_id: OwnerId,
}

/// Fields a user may change on an existing trip. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

impl TripPatch {
    pub fn validate(&self) -> ModelResult<()> {
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            return Err(ModelError::Validation("trip name must not be empty".into()));
        }
        check_dates(self.start_date, self.end_date)
    }
}

/// Replay payload of `update_trip`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripUpdate {
    pub id: TripId,
    #[serde(flatten)]
    pub patch: TripPatch,
}

/// A shopping-list item belonging to a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub trip_id: TripId,
    pub name: String,
    pub quantity: u32,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub purchased: bool,
    pub owner_id: OwnerId,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub synced: bool,
}

impl Item {
    pub fn from_new(new: &NewItem, now: i64) -> Self {
        Self {
            id: new.id,
            trip_id: new.trip_id,
            name: new.name.clone(),
            quantity: new.quantity,
            category: new.category.clone(),
            purchased: false,
            owner_id: new.owner_id.clone(),
            created_at: now,
            updated_at: now,
            synced: false,
        }
    }

    pub fn apply(&mut self, patch: &ItemPatch, now: i64) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(quantity) = patch.quantity {
            self.quantity = quantity;
        }
        if let Some(category) = &patch.category {
            self.category = Some(category.clone());
        }
        self.updated_at = now;
    }
}

/// What a user submits to add an item to a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub category: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

impl ItemDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: default_quantity(),
            category: None,
        }
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.name.trim().is_empty() {
            return Err(ModelError::Validation("item name must not be empty".into()));
        }
        if self.quantity == 0 {
            return Err(ModelError::Validation("item quantity must be at least 1".into()));
        }
        Ok(())
    }

    pub fn into_new(self, id: ItemId, trip_id: TripId, owner_id: OwnerId) -> NewItem {
        NewItem {
            id,
            trip_id,
            name: self.name,
            quantity: self.quantity,
            category: self.category,
            owner_id,
        }
    }
}

/// Replay payload of `create_item`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub id: ItemId,
    pub trip_id: TripId,
    pub name: String,
    pub quantity: u32,
    #[serde(default)]
    pub category: Option<String>,
    pub owner_id: OwnerId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ItemPatch {
    pub fn validate(&self) -> ModelResult<()> {
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            return Err(ModelError::Validation("item name must not be empty".into()));
        }
        if self.quantity == Some(0) {
            return Err(ModelError::Validation("item quantity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Replay payload of `update_item`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub id: ItemId,
    #[serde(flatten)]
    pub patch: ItemPatch,
}

fn check_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> ModelResult<()> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(ModelError::Validation(format!(
            "trip ends ({end}) before it starts ({start})"
        ))),
        _ => Ok(()),
    }
}
