//! Status aggregation: one derived sync state computed from engine events.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};

use super::events::{EventBus, SubscriptionId, SyncEvent, SyncEventKind};
use crate::config::SyncSettings;
use crate::models::EntityRef;
use crate::monitor::{NetworkMonitor, SessionProvider};

const MIN_SYNCS_FOR_RATE: u64 = 5;
const MIN_SUCCESS_RATE: f64 = 0.8;
const QUEUE_BACKLOG_LIMIT: usize = 50;
const STALE_INTERVALS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncLevel {
    Synced,
    Offline,
    Syncing,
    Error,
    Pending,
}

impl SyncLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Error => "error",
            Self::Pending => "pending",
        }
    }
}

impl fmt::Display for SyncLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rolling sync counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
}

impl SyncStats {
    /// Share of successful attempts, `None` before any attempt
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.successful as f64 / self.total as f64)
    }
}

/// Snapshot handed to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedStatus {
    pub level: SyncLevel,
    pub message: String,
    pub online: bool,
    pub authenticated: bool,
    pub in_flight: bool,
    /// Queued operations, including retries waiting for backoff
    pub queue_depth: usize,
    /// Change signals not yet turned into operations
    pub pending_changes: usize,
    /// Entities with local changes the remote has not acknowledged
    pub dirty_count: usize,
    pub conflict_count: usize,
    pub failed_count: usize,
    /// Last successful operation (Unix ms)
    pub last_sync_at: Option<i64>,
    pub last_error: Option<String>,
    pub stats: SyncStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncHealth {
    pub healthy: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Counts derived from the local store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalCounts {
    pub dirty: usize,
    /// Unresolved conflicts per entity
    pub conflicts: HashMap<EntityRef, usize>,
    /// Terminal sync errors recorded on entities
    pub failing: HashMap<EntityRef, String>,
}

#[derive(Default)]
struct StatusState {
    history: VecDeque<SyncEvent>,
    stats: SyncStats,
    failing: HashMap<EntityRef, String>,
    conflicts: HashMap<EntityRef, usize>,
    queue_depth: usize,
    pending_changes: usize,
    dirty_count: usize,
    in_flight: bool,
    last_sync_at: Option<i64>,
    last_error: Option<String>,
}

type Watcher = Arc<dyn Fn(&DetailedStatus) + Send + Sync>;

struct StatusInner {
    settings: SyncSettings,
    network: NetworkMonitor,
    session: Arc<dyn SessionProvider>,
    state: Mutex<StatusState>,
    watchers: Mutex<Vec<(u64, Watcher)>>,
    next_watcher: AtomicU64,
}

/// Observes engine events and derives a single status.
///
/// Owns the bounded event history; never touches entities.
#[derive(Clone)]
pub struct StatusAggregator {
    inner: Arc<StatusInner>,
}

impl StatusAggregator {
    pub fn new(
        settings: SyncSettings,
        network: NetworkMonitor,
        session: Arc<dyn SessionProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(StatusInner {
                settings,
                network,
                session,
                state: Mutex::new(StatusState::default()),
                watchers: Mutex::new(Vec::new()),
                next_watcher: AtomicU64::new(0),
            }),
        }
    }

    /// Feed every event published on `bus` into this aggregator
    pub fn attach(&self, bus: &EventBus) -> SubscriptionId {
        let weak = Arc::downgrade(&self.inner);
        bus.subscribe(move |event| {
            if let Some(inner) = weak.upgrade() {
                Self { inner }.observe(event);
            }
        })
    }

    pub fn observe(&self, event: &SyncEvent) {
        {
            let mut state = self.state();
            let capacity = self.inner.settings.event_history_capacity;
            state.history.push_back(event.clone());
            while state.history.len() > capacity {
                state.history.pop_front();
            }
            apply_event(&mut state, event);
        }
        self.notify();
    }

    /// Replace store-derived counts, typically before reading a snapshot
    pub fn refresh_local(&self, counts: LocalCounts) {
        let mut state = self.state();
        state.dirty_count = counts.dirty;
        state.conflicts = counts.conflicts;
        if state.last_error.is_none() {
            state.last_error = counts.failing.values().next().cloned();
        }
        state.failing = counts.failing;
    }

    /// Current status using the session to decide authentication
    pub fn current(&self) -> DetailedStatus {
        self.current_for(self.inner.session.current_user().is_some())
    }

    pub fn current_for(&self, authenticated: bool) -> DetailedStatus {
        let online = self.inner.network.is_online();
        let state = self.state();
        let conflict_count: usize = state.conflicts.values().sum();
        let failed_count = state.failing.len();

        let (level, message) = if !authenticated {
            (
                SyncLevel::Synced,
                "Sync disabled, sign in to back up your documents".to_string(),
            )
        } else if !online {
            (
                SyncLevel::Offline,
                "Offline, changes will sync when connection is restored".to_string(),
            )
        } else if state.in_flight {
            (SyncLevel::Syncing, "Syncing changes".to_string())
        } else if conflict_count > 0 {
            (
                SyncLevel::Error,
                format!("{conflict_count} conflict(s) need resolution"),
            )
        } else if failed_count > 0 {
            (
                SyncLevel::Error,
                format!("{failed_count} item(s) failed to sync"),
            )
        } else if state.queue_depth > 0 || state.dirty_count > 0 || state.pending_changes > 0 {
            let pending = state
                .queue_depth
                .max(state.dirty_count)
                .max(state.pending_changes);
            (SyncLevel::Pending, format!("{pending} change(s) waiting to sync"))
        } else {
            (SyncLevel::Synced, "All changes synced".to_string())
        };

        DetailedStatus {
            level,
            message,
            online,
            authenticated,
            in_flight: state.in_flight,
            queue_depth: state.queue_depth,
            pending_changes: state.pending_changes,
            dirty_count: state.dirty_count,
            conflict_count,
            failed_count,
            last_sync_at: state.last_sync_at,
            last_error: state.last_error.clone(),
            stats: state.stats,
        }
    }

    /// Events oldest first
    pub fn history(&self) -> Vec<SyncEvent> {
        self.state().history.iter().cloned().collect()
    }

    /// Evaluate sync health at time `now` (Unix ms)
    pub fn health(&self, authenticated: bool, now: i64) -> SyncHealth {
        let status = self.current_for(authenticated);
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();
        let mut report = |issue: String, recommendation: &str| {
            issues.push(issue);
            recommendations.push(recommendation.to_string());
        };

        if !authenticated {
            report(
                "No authenticated user".to_string(),
                "Sign in to enable cloud sync",
            );
        }
        if !status.online {
            report(
                "Network is offline".to_string(),
                "Check your internet connection",
            );
        }
        if status.failed_count > 0 {
            report(
                format!("{} item(s) failed to sync", status.failed_count),
                "Review the sync errors and retry with a forced sync",
            );
        }
        if status.conflict_count > 0 {
            report(
                format!("{} unresolved conflict(s)", status.conflict_count),
                "Resolve conflicts to resume syncing the affected documents",
            );
        }
        if status.stats.total >= MIN_SYNCS_FOR_RATE {
            if let Some(rate) = status.stats.success_rate() {
                if rate < MIN_SUCCESS_RATE {
                    report(
                        format!("Low sync success rate ({:.0}%)", rate * 100.0),
                        "Check connectivity and remote service availability",
                    );
                }
            }
        }
        if status.queue_depth > QUEUE_BACKLOG_LIMIT {
            report(
                format!("Sync queue backlog ({} operations)", status.queue_depth),
                "Stay online until the queue drains",
            );
        }

        let has_pending = status.queue_depth > 0 || status.dirty_count > 0;
        let stale_after = i64::try_from(self.inner.settings.sync_interval.as_millis())
            .unwrap_or(i64::MAX)
            .saturating_mul(STALE_INTERVALS);
        let stale = status
            .last_sync_at
            .is_some_and(|last| now.saturating_sub(last) > stale_after);
        if has_pending && stale {
            report(
                "Last successful sync is stale".to_string(),
                "Force a sync to upload pending changes",
            );
        }

        SyncHealth {
            healthy: issues.is_empty(),
            issues,
            recommendations,
        }
    }

    /// Push a snapshot to `callback` on every state-affecting event
    pub fn subscribe(
        &self,
        callback: impl Fn(&DetailedStatus) + Send + Sync + 'static,
    ) -> StatusSubscription {
        let id = self.inner.next_watcher.fetch_add(1, Ordering::Relaxed);
        self.watchers().push((id, Arc::new(callback)));
        StatusSubscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.watchers().len()
    }

    fn notify(&self) {
        let watchers: Vec<Watcher> = self
            .watchers()
            .iter()
            .map(|(_, watcher)| Arc::clone(watcher))
            .collect();
        if watchers.is_empty() {
            return;
        }
        let status = self.current();
        for watcher in watchers {
            watcher(&status);
        }
    }

    fn state(&self) -> MutexGuard<'_, StatusState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn watchers(&self) -> MutexGuard<'_, Vec<(u64, Watcher)>> {
        self.inner
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle for a status subscription
pub struct StatusSubscription {
    id: u64,
    inner: Weak<StatusInner>,
}

impl StatusSubscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner
                .watchers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

fn apply_event(state: &mut StatusState, event: &SyncEvent) {
    match &event.kind {
        SyncEventKind::SyncStart { .. } => state.in_flight = true,
        SyncEventKind::SyncSuccess { entity, .. } => {
            state.in_flight = false;
            state.stats.total += 1;
            state.stats.successful += 1;
            state.failing.remove(entity);
            state.last_sync_at = Some(event.timestamp);
        }
        SyncEventKind::SyncError {
            entity,
            error,
            retrying,
            ..
        } => {
            state.in_flight = false;
            state.stats.total += 1;
            state.stats.failed += 1;
            state.last_error = Some(error.clone());
            if let (Some(entity), false) = (entity, retrying) {
                state.failing.insert(entity.clone(), error.clone());
            }
        }
        SyncEventKind::ConflictDetected {
            entity, unresolved, ..
        } => {
            if *unresolved > 0 {
                state.conflicts.insert(entity.clone(), *unresolved);
            } else {
                state.conflicts.remove(entity);
            }
        }
        SyncEventKind::ConflictResolved { entity } => {
            state.conflicts.remove(entity);
        }
        SyncEventKind::ConnectionChange { .. } => {}
        SyncEventKind::QueueChanged { depth } => state.queue_depth = *depth,
        SyncEventKind::ChangesPending { count } => state.pending_changes = *count,
    }
}
