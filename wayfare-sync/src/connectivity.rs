//! Online/offline state and its transitions.

use tokio::sync::watch;
use tracing::info;

/// Network reachability as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn from_online(online: bool) -> Self {
        if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

/// Holds the current [`Connectivity`] and notifies subscribers when it
/// changes. Reporting the state it already has is a no-op.
///
/// Alongside the state it counts offline → online transitions. A watch
/// receiver only sees the latest state, so a quick drop and recovery can
/// look like no change at all; the counter still advances.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: watch::Sender<Connectivity>,
    reconnects: watch::Sender<u64>,
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity) -> Self {
        let (state, _) = watch::channel(initial);
        let (reconnects, _) = watch::channel(0);
        Self { state, reconnects }
    }

    /// Records a report from the host's network primitive. Returns `true`
    /// when this was a transition.
    pub fn set_online(&self, online: bool) -> bool {
        self.set(Connectivity::from_online(online))
    }

    pub fn set(&self, next: Connectivity) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            info!(state = ?next, "connectivity changed");
            if next.is_online() {
                self.reconnects.send_modify(|n| *n += 1);
            }
        }
        changed
    }

    pub fn state(&self) -> Connectivity {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }

    /// Offline → online transitions seen so far.
    pub fn reconnect_count(&self) -> u64 {
        *self.reconnects.borrow()
    }

    /// Receiver of the reconnect counter. Marked changed whenever at least
    /// one reconnect happened since it was last read.
    pub fn subscribe_reconnects(&self) -> watch::Receiver<u64> {
        self.reconnects.subscribe()
    }

    /// Resolves on the next offline → online transition.
    ///
    /// If currently online this first waits for the connection to drop.
    pub async fn wait_for_reconnect(&self) {
        let mut rx = self.subscribe_reconnects();
        // The sender lives in `self`, so `changed` cannot fail while we hold it.
        let _ = rx.changed().await;
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(Connectivity::Online)
    }
}
