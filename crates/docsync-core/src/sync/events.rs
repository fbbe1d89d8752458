//! Typed sync events and the observer bus that carries them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use super::OperationKind;
use crate::models::EntityRef;
use crate::util::now_millis;

/// Something that happened inside the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Unix ms
    pub timestamp: i64,
    #[serde(flatten)]
    pub kind: SyncEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEventKind {
    SyncStart {
        entity: EntityRef,
        operation: OperationKind,
    },
    SyncSuccess {
        entity: EntityRef,
        operation: OperationKind,
    },
    SyncError {
        entity: Option<EntityRef>,
        operation: Option<OperationKind>,
        error: String,
        /// A retry has been scheduled
        retrying: bool,
    },
    ConflictDetected {
        entity: EntityRef,
        count: usize,
        /// Conflicts left for the user after automatic resolution
        unresolved: usize,
    },
    ConflictResolved {
        entity: EntityRef,
    },
    ConnectionChange {
        online: bool,
    },
    QueueChanged {
        depth: usize,
    },
    ChangesPending {
        count: usize,
    },
}

impl SyncEvent {
    pub fn now(kind: SyncEventKind) -> Self {
        Self {
            timestamp: now_millis(),
            kind,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self.kind {
            SyncEventKind::SyncStart { .. } => "sync_start",
            SyncEventKind::SyncSuccess { .. } => "sync_success",
            SyncEventKind::SyncError { .. } => "sync_error",
            SyncEventKind::ConflictDetected { .. } => "conflict_detected",
            SyncEventKind::ConflictResolved { .. } => "conflict_resolved",
            SyncEventKind::ConnectionChange { .. } => "connection_change",
            SyncEventKind::QueueChanged { .. } => "queue_changed",
            SyncEventKind::ChangesPending { .. } => "changes_pending",
        }
    }
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(SubscriptionId, Handler)>>,
}

/// Synchronous fan-out of [`SyncEvent`]s to registered observers.
///
/// Handlers run on the emitting task, outside the bus lock, so a handler may
/// subscribe or unsubscribe without deadlocking.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: impl Fn(&SyncEvent) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers().push((id, Arc::new(handler)));
        id
    }

    /// Returns whether a handler was removed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub fn emit(&self, kind: SyncEventKind) {
        let event = SyncEvent::now(kind);
        let handlers: Vec<Handler> = self
            .handlers()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(&event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers().len()
    }

    fn handlers(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Handler)>> {
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
