//! Who the current user is, as far as the sync layer cares.

use std::sync::RwLock;
use wayfare_types::OwnerId;

/// Resolves the signed-in identity. `None` means no session is available,
/// which is normal while offline.
pub trait SessionProvider: Send + Sync {
    fn current_owner(&self) -> Option<OwnerId>;
}

/// A session held in memory and updated by the host on sign-in/sign-out.
#[derive(Debug, Default)]
pub struct StaticSession {
    owner: RwLock<Option<OwnerId>>,
}

impl StaticSession {
    pub fn signed_in(owner: OwnerId) -> Self {
        Self {
            owner: RwLock::new(Some(owner)),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, owner: OwnerId) {
        *self.owner.write().unwrap_or_else(|e| e.into_inner()) = Some(owner);
    }

    pub fn sign_out(&self) {
        *self.owner.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl SessionProvider for StaticSession {
    fn current_owner(&self) -> Option<OwnerId> {
        self.owner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
