//! Identifier types used throughout Wayfare.
//!
//! Record and ledger ids are UUID v7: generated on the client, time-ordered,
//! and stable across retries. The id assigned at an offline write is the id
//! the server eventually stores, which is what makes replay idempotent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new time-ordered id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Parses an id from its hyphenated string form.
            pub fn parse(s: &str) -> crate::Result<Self> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = crate::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

uuid_id! {
    /// Identifier of a trip. Fixed at creation, including offline creation.
    TripId
}

uuid_id! {
    /// Identifier of a shopping-list item.
    ItemId
}

uuid_id! {
    /// Identifier of a pending-action ledger entry.
    ///
    /// Unrelated to the id of the entity the action targets.
    ActionId
}

/// The authenticated user a record belongs to.
///
/// Opaque to this crate: whatever the session layer hands out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Identity used for offline writes when no session can be resolved.
    pub const OFFLINE_SENTINEL: &'static str = "offline-user";

    /// Creates an owner id. Empty ids are rejected.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(crate::Error::InvalidOwner("owner id must not be empty".into()));
        }
        Ok(Self(id))
    }

    /// The sentinel owner for writes made without a session.
    #[must_use]
    pub fn offline_sentinel() -> Self {
        Self(Self::OFFLINE_SENTINEL.to_string())
    }

    /// Whether this is the offline sentinel rather than a real user.
    #[must_use]
    pub fn is_offline_sentinel(&self) -> bool {
        self.0 == Self::OFFLINE_SENTINEL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OwnerId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
