//! Environment signals the engine observes: connectivity, page visibility and
//! the authenticated session.
//!
//! The host application feeds platform events into these handles; the engine
//! reads the current value and subscribes to changes through `watch` channels.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Opaque token identifying the authenticated user
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("UserId([REDACTED])")
    }
}

/// Supplies the current user; `None` means sync is disabled
pub trait SessionProvider: Send + Sync {
    fn current_user(&self) -> Option<UserId>;
}

/// Shared boolean signal with change notification
#[derive(Clone)]
struct Flag {
    tx: Arc<watch::Sender<bool>>,
}

impl Flag {
    fn new(initial: bool) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    fn get(&self) -> bool {
        *self.tx.borrow()
    }

    fn set(&self, value: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Network reachability as reported by the platform
#[derive(Clone)]
pub struct NetworkMonitor {
    flag: Flag,
}

impl NetworkMonitor {
    pub fn new(online: bool) -> Self {
        Self {
            flag: Flag::new(online),
        }
    }

    pub fn is_online(&self) -> bool {
        self.flag.get()
    }

    /// Update reachability, returning whether the value changed
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.flag.set(online);
        if changed {
            tracing::debug!(online, "Network state changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.flag.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Whether the application window is visible to the user
#[derive(Clone)]
pub struct VisibilityMonitor {
    flag: Flag,
}

impl VisibilityMonitor {
    pub fn new(visible: bool) -> Self {
        Self {
            flag: Flag::new(visible),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.flag.get()
    }

    pub fn set_visible(&self, visible: bool) -> bool {
        self.flag.set(visible)
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.flag.subscribe()
    }
}

impl Default for VisibilityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Session holder the host updates on sign-in and sign-out
#[derive(Clone)]
pub struct SessionSlot {
    tx: Arc<watch::Sender<Option<UserId>>>,
}

impl SessionSlot {
    pub fn new(user: Option<UserId>) -> Self {
        let (tx, _rx) = watch::channel(user);
        Self { tx: Arc::new(tx) }
    }

    pub fn signed_in(user: UserId) -> Self {
        Self::new(Some(user))
    }

    pub fn sign_in(&self, user: UserId) {
        self.tx.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        self.tx.send_replace(None);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.tx.subscribe()
    }
}

impl Default for SessionSlot {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SessionProvider for SessionSlot {
    fn current_user(&self) -> Option<UserId> {
        self.tx.borrow().clone()
    }
}
