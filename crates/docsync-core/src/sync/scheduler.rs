//! Trigger scheduler: decides when work enters the operation queue.
//!
//! Change signals from the editing layer are collected in a deduplicated set
//! and flushed after a short debounce. Periodic, reconnect and visibility
//! triggers run batch passes from a background task started with
//! [`TriggerScheduler::start`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::events::SyncEventKind;
use super::operation::SyncOperation;
use super::queue::{DrainReport, OperationQueue, with_timeout};
use crate::error::Result;
use crate::models::{Entity, EntityId, EntityKind, EntityRef};
use crate::monitor::{SessionProvider, UserId, VisibilityMonitor};
use crate::store::EntityFilter;

/// Summary of one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Operations added to the queue by this pass
    pub enqueued: usize,
    pub drain: DrainReport,
}

#[derive(Default)]
struct SchedulerState {
    changes: VecDeque<EntityRef>,
    flush_at: Option<Instant>,
    /// User supplied with the change signals when no session is active
    flush_user: Option<UserId>,
    last_activity: Option<Instant>,
    last_sync: Option<Instant>,
}

struct SchedulerInner {
    queue: OperationQueue,
    visibility: VisibilityMonitor,
    session: Arc<dyn SessionProvider>,
    state: Mutex<SchedulerState>,
    wake: Notify,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct TriggerScheduler {
    inner: Arc<SchedulerInner>,
}

impl TriggerScheduler {
    pub fn new(
        queue: OperationQueue,
        visibility: VisibilityMonitor,
        session: Arc<dyn SessionProvider>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(SchedulerInner {
                queue,
                visibility,
                session,
                state: Mutex::new(SchedulerState::default()),
                wake: Notify::new(),
                shutdown,
                task: Mutex::new(None),
            }),
        }
    }

    /// Record that `entity` changed locally and schedule its upload.
    pub fn queue_document_sync(&self, entity: EntityRef, user: Option<&UserId>) {
        let settings = self.inner.queue.settings();
        let count = {
            let mut state = self.state();
            if !state.changes.contains(&entity) {
                state.changes.push_back(entity.clone());
            }
            if let Some(user) = user {
                state.flush_user = Some(user.clone());
            }
            state.changes.len()
        };
        self.inner
            .queue
            .emit(SyncEventKind::ChangesPending { count });

        if !settings.triggers.document_change {
            return;
        }
        if self.should_sync(user.is_some()) {
            tracing::debug!(entity = %entity, pending = count, "Scheduling change sync");
            self.schedule_flush(settings.change_debounce);
        } else {
            tracing::debug!(entity = %entity, "Change recorded, sync preconditions not met");
        }
    }

    /// Note user input; pending changes are flushed after a short debounce.
    pub fn record_activity(&self) {
        let has_changes = {
            let mut state = self.state();
            state.last_activity = Some(Instant::now());
            !state.changes.is_empty()
        };
        let settings = self.inner.queue.settings();
        let user_present = self.state().flush_user.is_some()
            || self.inner.session.current_user().is_some();
        if has_changes && settings.triggers.user_activity && self.should_sync(user_present) {
            self.schedule_flush(settings.activity_debounce);
        }
    }

    pub fn is_user_active(&self) -> bool {
        let threshold = self.inner.queue.settings().user_activity_threshold;
        self.state()
            .last_activity
            .is_some_and(|at| at.elapsed() <= threshold)
    }

    /// Preconditions every automatic trigger must pass
    pub fn should_sync(&self, user_present: bool) -> bool {
        user_present
            && self.inner.queue.network().is_online()
            && self.inner.visibility.is_visible()
            && (!self.inner.queue.settings().require_user_activity || self.is_user_active())
    }

    pub fn pending_changes(&self) -> usize {
        self.state().changes.len()
    }

    /// Move up to `limit` change signals into the queue as uploads
    pub async fn flush_changes(&self, limit: Option<usize>) -> usize {
        let batch: Vec<EntityRef> = {
            let mut state = self.state();
            let take = limit.map_or(state.changes.len(), |limit| limit.min(state.changes.len()));
            state.changes.drain(..take).collect()
        };

        let store = self.inner.queue.store();
        let mut enqueued = 0;
        for entity in batch {
            match store.get(entity.kind, &entity.id).await {
                Ok(Some(current)) if current.is_dirty() => {
                    self.inner.queue.enqueue(SyncOperation::upload(current));
                    enqueued += 1;
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(entity = %entity, error = %error, "Failed to read changed entity");
                }
            }
        }

        let count = self.pending_changes();
        self.inner
            .queue
            .emit(SyncEventKind::ChangesPending { count });
        enqueued
    }

    /// Enqueue every difference between the local store and the remote.
    ///
    /// Entities changed on both sides are only downloaded so conflict
    /// detection runs before anything is uploaded.
    pub async fn full_sync(&self, user: &UserId) -> Result<usize> {
        let store = self.inner.queue.store();
        let remote = self.inner.queue.remote();
        let timeout = self.inner.queue.settings().request_timeout;
        let mut enqueued = 0;

        for kind in EntityKind::ALL {
            let local = store.list(kind, &EntityFilter::all()).await?;
            let since = oldest_watermark(&local);
            let records = with_timeout(timeout, remote.list(user, kind, since)).await?;
            let by_id: HashMap<&EntityId, &Entity> =
                local.iter().map(|entity| (entity.id(), entity)).collect();

            let mut downloading = HashSet::new();
            for record in records {
                let behind = by_id
                    .get(&record.local_id)
                    .is_none_or(|entity| entity.sync().is_behind(record.updated_at));
                if behind {
                    self.inner.queue.enqueue(SyncOperation::download(
                        EntityRef::new(kind, record.local_id.clone()),
                        Some(record.id),
                    ));
                    downloading.insert(record.local_id);
                    enqueued += 1;
                }
            }

            for entity in local {
                if entity.is_dirty()
                    && !entity.sync().has_unresolved_conflicts()
                    && !downloading.contains(entity.id())
                {
                    self.inner.queue.enqueue(SyncOperation::upload(entity));
                    enqueued += 1;
                }
            }
        }

        tracing::debug!(enqueued, "Full sync pass planned");
        Ok(enqueued)
    }

    /// Batch pass used by periodic, reconnect and visibility triggers.
    ///
    /// Flushes at most `max_batch_size` change signals, or runs a full
    /// listing pass when none are pending.
    pub async fn run_batch(&self, user: &UserId) -> SyncReport {
        let enqueued = if self.pending_changes() > 0 {
            self.flush_changes(Some(self.inner.queue.settings().max_batch_size))
                .await
        } else {
            self.full_sync_or_report(user).await
        };
        let drain = self.inner.queue.drain(user).await;
        self.mark_synced_now();
        SyncReport { enqueued, drain }
    }

    /// Flush every change signal, reconcile and drain when online.
    ///
    /// Offline, the work stays queued and no error is reported.
    pub async fn force_sync(&self, user: &UserId) -> SyncReport {
        let mut enqueued = self.flush_changes(None).await;
        if !self.inner.queue.network().is_online() {
            tracing::info!(
                queued = self.inner.queue.len(),
                "Offline, changes will sync when connection is restored"
            );
            return SyncReport {
                enqueued,
                drain: DrainReport {
                    remaining: self.inner.queue.len(),
                    ..DrainReport::default()
                },
            };
        }

        enqueued += self.full_sync_or_report(user).await;
        let drain = self.inner.queue.drain(user).await;
        self.mark_synced_now();
        SyncReport { enqueued, drain }
    }

    async fn full_sync_or_report(&self, user: &UserId) -> usize {
        match self.full_sync(user).await {
            Ok(enqueued) => enqueued,
            Err(error) => {
                tracing::warn!(error = %error, "Full sync listing failed");
                self.inner.queue.emit(SyncEventKind::SyncError {
                    entity: None,
                    operation: None,
                    error: error.to_string(),
                    retrying: false,
                });
                0
            }
        }
    }

    /// Spawn the background trigger loop; a no-op when already running.
    pub fn start(&self) {
        let mut task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        self.inner.shutdown.send_replace(false);
        let scheduler = self.clone();
        *task = Some(tokio::spawn(async move { scheduler.run().await }));
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the background loop and wait for it to exit
    pub async fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        let handle = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                tracing::warn!(error = %error, "Sync scheduler task ended abnormally");
            }
        }
    }

    async fn run(self) {
        let settings = self.inner.queue.settings().clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        if *shutdown.borrow_and_update() {
            return;
        }
        let mut network = self.inner.queue.network().subscribe();
        let mut visibility = self.inner.visibility.subscribe();
        let mut online = *network.borrow_and_update();
        let mut visible = *visibility.borrow_and_update();

        let mut periodic = tokio::time::interval_at(
            Instant::now() + settings.sync_interval,
            settings.sync_interval,
        );
        periodic.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = settings.sync_interval.as_secs(),
            "Sync scheduler started"
        );

        loop {
            let flush_at = self.state().flush_at;
            let debounce = async move {
                match flush_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = periodic.tick() => {
                    if settings.triggers.periodic {
                        self.trigger_batch("periodic").await;
                    }
                }
                changed = network.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now_online = *network.borrow_and_update();
                    if now_online != online {
                        online = now_online;
                        tracing::info!(online, "Network status changed");
                        self.inner.queue.emit(SyncEventKind::ConnectionChange { online });
                        if online && settings.triggers.network_reconnect {
                            self.trigger_batch("reconnect").await;
                        }
                    }
                }
                changed = visibility.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now_visible = *visibility.borrow_and_update();
                    let regained = now_visible && !visible;
                    visible = now_visible;
                    if regained
                        && settings.triggers.visibility
                        && self.sync_is_stale(settings.sync_interval)
                    {
                        self.trigger_batch("visibility").await;
                    }
                }
                () = self.inner.wake.notified() => {}
                () = debounce => {
                    self.state().flush_at = None;
                    self.flush_due().await;
                }
            }
        }

        tracing::info!("Sync scheduler stopped");
    }

    async fn trigger_batch(&self, reason: &'static str) {
        let Some(user) = self.current_user() else {
            tracing::debug!(reason, "Skipping sync trigger, no authenticated user");
            return;
        };
        if !self.should_sync(true) {
            tracing::debug!(reason, "Skipping sync trigger, preconditions not met");
            return;
        }
        tracing::debug!(reason, "Running batch sync");
        let report = self.run_batch(&user).await;
        tracing::info!(
            reason,
            enqueued = report.enqueued,
            processed = report.drain.processed,
            remaining = report.drain.remaining,
            "Batch sync finished"
        );
    }

    async fn flush_due(&self) {
        let user = self.state().flush_user.take().or_else(|| self.inner.session.current_user());
        let Some(user) = user else {
            return;
        };
        if !self.should_sync(true) {
            tracing::debug!("Debounced flush skipped, preconditions not met");
            return;
        }

        let max_batch = self.inner.queue.settings().max_batch_size;
        self.flush_changes(Some(max_batch)).await;
        self.inner.queue.drain(&user).await;
        self.mark_synced_now();

        if self.pending_changes() > 0 {
            self.state().flush_user = Some(user);
            self.schedule_flush(Duration::ZERO);
        }
    }

    fn current_user(&self) -> Option<UserId> {
        self.inner
            .session
            .current_user()
            .or_else(|| self.state().flush_user.clone())
    }

    fn schedule_flush(&self, delay: Duration) {
        let at = Instant::now() + delay;
        {
            let mut state = self.state();
            state.flush_at = Some(state.flush_at.map_or(at, |existing| existing.max(at)));
        }
        self.inner.wake.notify_one();
    }

    fn mark_synced_now(&self) {
        self.state().last_sync = Some(Instant::now());
    }

    fn sync_is_stale(&self, interval: Duration) -> bool {
        self.state()
            .last_sync
            .is_none_or(|at| at.elapsed() > interval)
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Earliest point all local entities agree with the remote; `None` lists everything
fn oldest_watermark(local: &[Entity]) -> Option<i64> {
    if local.is_empty() {
        return None;
    }
    let oldest = local
        .iter()
        .map(|entity| {
            let sync = entity.sync();
            sync.remote_revision.or(sync.last_sync_at).unwrap_or(0)
        })
        .min()
        .unwrap_or(0);
    (oldest > 0).then_some(oldest)
}
