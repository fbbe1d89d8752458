//! Operation queue: serialized uploads and downloads with bounded retries.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::conflict::ConflictResolver;
use super::events::{EventBus, SyncEventKind};
use super::operation::{OperationKind, SyncOperation};
use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::models::{Conflict, Entity, EntityRef};
use crate::monitor::{NetworkMonitor, UserId};
use crate::remote::{RemoteDraft, RemoteError, RemoteRecord, RemoteReplica};
use crate::store::EntityStore;
use crate::util::now_millis;

/// Result of executing one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Uploaded { remote_id: String },
    Downloaded,
    /// Conflicts were detected; `remaining` still need a user decision
    Conflicted { detected: usize, remaining: usize },
    Skipped(&'static str),
    RetryScheduled { attempt: u32, delay: Duration },
    Failed(String),
}

/// Tally of a drain pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub processed: usize,
    pub succeeded: usize,
    pub conflicted: usize,
    pub skipped: usize,
    pub retrying: usize,
    pub failed: usize,
    /// Operations left queued when the pass stopped
    pub remaining: usize,
}

impl DrainReport {
    fn record(&mut self, outcome: &OperationOutcome) {
        self.processed += 1;
        match outcome {
            OperationOutcome::Uploaded { .. }
            | OperationOutcome::Downloaded
            | OperationOutcome::Conflicted { remaining: 0, .. } => self.succeeded += 1,
            OperationOutcome::Conflicted { .. } => self.conflicted += 1,
            OperationOutcome::Skipped(_) => self.skipped += 1,
            OperationOutcome::RetryScheduled { .. } => self.retrying += 1,
            OperationOutcome::Failed(_) => self.failed += 1,
        }
    }
}

struct QueueInner {
    store: Arc<dyn EntityStore>,
    remote: Arc<dyn RemoteReplica>,
    network: NetworkMonitor,
    resolver: ConflictResolver,
    settings: SyncSettings,
    events: EventBus,
    pending: Mutex<VecDeque<SyncOperation>>,
    worker: tokio::sync::Mutex<()>,
    in_flight: AtomicBool,
    scheduled_retries: AtomicUsize,
}

/// FIFO of pending sync operations, drained by a single worker.
///
/// Enqueuing an operation whose entity and kind are already queued replaces
/// the queued one in place.
#[derive(Clone)]
pub struct OperationQueue {
    inner: Arc<QueueInner>,
}

impl OperationQueue {
    pub fn new(
        store: Arc<dyn EntityStore>,
        remote: Arc<dyn RemoteReplica>,
        network: NetworkMonitor,
        resolver: ConflictResolver,
        settings: SyncSettings,
        events: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                store,
                remote,
                network,
                resolver,
                settings,
                events,
                pending: Mutex::new(VecDeque::new()),
                worker: tokio::sync::Mutex::new(()),
                in_flight: AtomicBool::new(false),
                scheduled_retries: AtomicUsize::new(0),
            }),
        }
    }

    /// Add an operation, coalescing with a queued one for the same entity and kind.
    ///
    /// Returns the queue depth afterwards.
    pub fn enqueue(&self, operation: SyncOperation) -> usize {
        let depth = {
            let mut pending = self.pending();
            let key = operation.key();
            if let Some(existing) = pending.iter_mut().find(|queued| queued.key() == key) {
                tracing::debug!(entity = %operation.entity, operation = %operation.kind, "Coalesced queued sync operation");
                *existing = operation;
            } else {
                pending.push_back(operation);
            }
            pending.len()
        };
        self.publish_depth();
        depth
    }

    /// Re-add a retried operation unless a fresher one for the same key is queued
    fn enqueue_retry(&self, operation: SyncOperation) {
        {
            let mut pending = self.pending();
            let key = operation.key();
            if pending.iter().any(|queued| queued.key() == key) {
                return;
            }
            pending.push_back(operation);
        }
        self.publish_depth();
    }

    /// Queued operations plus retries waiting for their backoff to elapse
    pub fn depth(&self) -> usize {
        self.pending().len() + self.inner.scheduled_retries.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }

    pub fn snapshot(&self) -> Vec<SyncOperation> {
        self.pending().iter().cloned().collect()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    /// Execute the operation at the head of the queue.
    ///
    /// Returns `Ok(None)` when the queue is empty and [`Error::Offline`] when
    /// the network is down, leaving the queue untouched.
    pub async fn process_next(&self, user: &UserId) -> Result<Option<OperationOutcome>> {
        let _worker = self.inner.worker.lock().await;
        self.step(user).await
    }

    /// Process operations until the queue is empty or the network drops.
    ///
    /// Only one drain runs at a time; a concurrent call returns immediately
    /// and the running drain picks up whatever was enqueued meanwhile.
    pub async fn drain(&self, user: &UserId) -> DrainReport {
        let mut report = DrainReport::default();
        loop {
            let Ok(worker) = self.inner.worker.try_lock() else {
                tracing::debug!("Sync queue already draining");
                break;
            };
            loop {
                match self.step(user).await {
                    Ok(Some(outcome)) => report.record(&outcome),
                    Ok(None) | Err(_) => break,
                }
            }
            drop(worker);
            if self.is_empty() || !self.inner.network.is_online() {
                break;
            }
        }
        report.remaining = self.len();
        if report.processed > 0 {
            tracing::info!(
                processed = report.processed,
                succeeded = report.succeeded,
                failed = report.failed,
                retrying = report.retrying,
                remaining = report.remaining,
                "Sync queue drained"
            );
        }
        report
    }

    async fn step(&self, user: &UserId) -> Result<Option<OperationOutcome>> {
        if !self.inner.network.is_online() {
            return Err(Error::Offline);
        }
        let Some(operation) = self.pending().pop_front() else {
            return Ok(None);
        };
        self.publish_depth();
        Ok(Some(self.execute(user, operation).await))
    }

    async fn execute(&self, user: &UserId, operation: SyncOperation) -> OperationOutcome {
        let entity = operation.entity.clone();
        let kind = operation.kind;
        tracing::debug!(
            entity = %entity,
            operation = %kind,
            attempt = operation.retry_count + 1,
            "Processing sync operation"
        );

        self.inner.in_flight.store(true, Ordering::SeqCst);
        self.emit(SyncEventKind::SyncStart {
            entity: entity.clone(),
            operation: kind,
        });

        let result = match kind {
            OperationKind::Upload => self.upload(user, &operation).await,
            OperationKind::Download => self.download(user, &operation).await,
        };
        self.inner.in_flight.store(false, Ordering::SeqCst);

        match result {
            Ok(outcome) => {
                self.emit(SyncEventKind::SyncSuccess {
                    entity,
                    operation: kind,
                });
                outcome
            }
            Err(error) => self.handle_failure(user, operation, &error).await,
        }
    }

    async fn upload(&self, user: &UserId, operation: &SyncOperation) -> Result<OperationOutcome> {
        let entity = self.load(&operation.entity).await?;
        if entity.sync().has_unresolved_conflicts() {
            tracing::debug!(entity = %operation.entity, "Skipping upload of conflicted entity");
            return Ok(OperationOutcome::Skipped("unresolved conflicts"));
        }
        if !entity.is_dirty() {
            return Ok(OperationOutcome::Skipped("already synced"));
        }

        let fields = entity.wire_fields()?;
        let record = match entity.sync().cloud_id.clone() {
            Some(remote_id) => {
                self.remote_call(self.inner.remote.update_by_id(
                    user,
                    entity.kind(),
                    &remote_id,
                    &fields,
                ))
                .await?
            }
            None => {
                let draft = RemoteDraft {
                    kind: entity.kind(),
                    local_id: entity.id().clone(),
                    fields,
                };
                self.remote_call(self.inner.remote.create(user, &draft))
                    .await?
            }
        };

        // The entity may have been edited while the request was in flight.
        let mut current = self
            .inner
            .store
            .get(entity.kind(), entity.id())
            .await?
            .unwrap_or_else(|| entity.clone());
        let edited_meanwhile = current.updated_at() > entity.updated_at();
        let synced_at = if edited_meanwhile {
            entity.updated_at()
        } else {
            now_millis().max(current.updated_at())
        };

        let sync = current.sync_mut();
        sync.cloud_id = Some(record.id.clone());
        sync.remote_revision = Some(record.updated_at);
        sync.mark_synced(synced_at);
        self.inner.store.put(current).await?;

        if edited_meanwhile {
            tracing::debug!(entity = %operation.entity, "Entity changed during upload, keeping it dirty");
        }
        Ok(OperationOutcome::Uploaded {
            remote_id: record.id,
        })
    }

    async fn download(&self, user: &UserId, operation: &SyncOperation) -> Result<OperationOutcome> {
        let target = &operation.entity;
        let local = self.inner.store.get(target.kind, &target.id).await?;
        let remote_id = operation
            .remote_id
            .clone()
            .or_else(|| local.as_ref().and_then(|entity| entity.sync().cloud_id.clone()));
        let Some(remote_id) = remote_id else {
            return Ok(OperationOutcome::Skipped("no linked remote record"));
        };

        let record = self
            .remote_call(self.inner.remote.get_by_id(user, target.kind, &remote_id))
            .await?
            .ok_or_else(|| RemoteError::NotFound(format!("{target} ({remote_id})")))?;

        match local {
            None => self.adopt_remote(target, record).await,
            Some(local) => self.reconcile(local, record).await,
        }
    }

    /// Create the local copy of a record that only exists remotely
    async fn adopt_remote(&self, target: &EntityRef, record: RemoteRecord) -> Result<OperationOutcome> {
        let mut entity =
            Entity::from_remote_fields(target.kind, target.id.clone(), &record.fields, record.updated_at)?;
        let sync = entity.sync_mut();
        sync.cloud_id = Some(record.id);
        sync.remote_revision = Some(record.updated_at);
        sync.mark_synced(now_millis().max(record.updated_at));
        self.inner.store.put(entity).await?;
        tracing::debug!(entity = %target, "Created local copy of remote entity");
        Ok(OperationOutcome::Downloaded)
    }

    async fn reconcile(&self, local: Entity, record: RemoteRecord) -> Result<OperationOutcome> {
        let entity_ref = local.entity_ref();
        if !local.sync().is_behind(record.updated_at) {
            return Ok(OperationOutcome::Skipped("up to date"));
        }

        let watermark = local.sync().watermark();
        let remote = local.with_remote_fields(&record.fields, record.updated_at)?;
        let conflicts = self.inner.resolver.detect(&local, &remote, watermark);

        if conflicts.is_empty() {
            if local.is_dirty() && record.updated_at <= watermark {
                // Remote revision moved but the remote data predates our edits.
                let mut kept = local;
                let sync = kept.sync_mut();
                sync.cloud_id = Some(record.id);
                sync.remote_revision = Some(record.updated_at);
                self.inner.store.put(kept.clone()).await?;
                self.enqueue(SyncOperation::upload(kept));
                return Ok(OperationOutcome::Skipped("local changes pending upload"));
            }

            let mut updated = remote;
            let sync = updated.sync_mut();
            sync.cloud_id = Some(record.id);
            sync.remote_revision = Some(record.updated_at);
            sync.mark_synced(now_millis().max(record.updated_at));
            self.inner.store.put(updated).await?;
            return Ok(OperationOutcome::Downloaded);
        }

        let detected = conflicts.len();
        tracing::warn!(entity = %entity_ref, conflicts = detected, "Sync conflict detected");

        let mut flagged = local;
        flagged.sync_mut().cloud_id = Some(record.id);

        if !self.inner.settings.auto_resolve_conflicts {
            self.emit(SyncEventKind::ConflictDetected {
                entity: entity_ref,
                count: detected,
                unresolved: detected,
            });
            flagged.sync_mut().conflicts = conflicts;
            self.inner.store.put(flagged).await?;
            return Ok(OperationOutcome::Conflicted {
                detected,
                remaining: detected,
            });
        }

        let outcome = self.inner.resolver.auto_resolve(conflicts);
        self.emit(SyncEventKind::ConflictDetected {
            entity: entity_ref,
            count: detected,
            unresolved: outcome.remaining.len(),
        });
        if outcome.is_complete() {
            self.apply_resolution(flagged, &outcome.resolved).await?;
            return Ok(OperationOutcome::Conflicted {
                detected,
                remaining: 0,
            });
        }

        let remaining = outcome.remaining.len();
        let sync = flagged.sync_mut();
        sync.conflicts = outcome.resolved;
        sync.conflicts.extend(outcome.remaining);
        self.inner.store.put(flagged).await?;
        Ok(OperationOutcome::Conflicted {
            detected,
            remaining,
        })
    }

    /// Write resolved conflict values, clear the conflict list and bump the
    /// sync version. An upload is queued when a local or merged value won.
    pub(crate) async fn apply_resolution(
        &self,
        entity: Entity,
        resolved: &[Conflict],
    ) -> Result<Entity> {
        let mut merged = ConflictResolver::apply(&entity, resolved)?;
        let local_won = resolved
            .iter()
            .any(|conflict| conflict.resolved_value.as_ref() != Some(&conflict.remote_value));
        let remote_revision = resolved
            .iter()
            .map(|conflict| conflict.remote_updated_at)
            .max();

        {
            let sync = merged.sync_mut();
            sync.conflicts.clear();
            if let Some(revision) = remote_revision {
                sync.remote_revision = Some(sync.remote_revision.unwrap_or(0).max(revision));
            }
        }

        if local_won {
            let now = now_millis().max(merged.updated_at() + 1);
            merged.set_updated_at(now);
            let sync = merged.sync_mut();
            sync.sync_version += 1;
            sync.sync_error = None;
        } else {
            let synced_at = now_millis().max(merged.updated_at());
            merged.sync_mut().mark_synced(synced_at);
        }

        let stored = self.inner.store.put(merged).await?;
        let entity_ref = stored.entity_ref();
        tracing::info!(entity = %entity_ref, local_won, "Conflicts resolved");
        self.emit(SyncEventKind::ConflictResolved { entity: entity_ref });
        if local_won {
            self.enqueue(SyncOperation::upload(stored.clone()));
        }
        Ok(stored)
    }

    async fn handle_failure(
        &self,
        user: &UserId,
        mut operation: SyncOperation,
        error: &Error,
    ) -> OperationOutcome {
        operation.retry_count += 1;
        let message = error.to_string();
        let settings = &self.inner.settings;

        if error.is_retryable() && operation.retry_count < settings.max_retries {
            let delay = settings.backoff_delay(operation.retry_count);
            tracing::warn!(
                entity = %operation.entity,
                operation = %operation.kind,
                attempt = operation.retry_count,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %message,
                "Sync operation failed, retrying"
            );
            self.emit(SyncEventKind::SyncError {
                entity: Some(operation.entity.clone()),
                operation: Some(operation.kind),
                error: message,
                retrying: true,
            });
            let attempt = operation.retry_count;
            self.schedule_retry(user.clone(), operation, delay);
            return OperationOutcome::RetryScheduled { attempt, delay };
        }

        tracing::error!(
            entity = %operation.entity,
            operation = %operation.kind,
            attempts = operation.retry_count,
            error = %message,
            "Sync operation failed"
        );
        if let Err(store_error) = self.record_entity_error(&operation.entity, &message).await {
            tracing::warn!(entity = %operation.entity, error = %store_error, "Failed to record sync error");
        }
        self.emit(SyncEventKind::SyncError {
            entity: Some(operation.entity),
            operation: Some(operation.kind),
            error: message.clone(),
            retrying: false,
        });
        OperationOutcome::Failed(message)
    }

    fn schedule_retry(&self, user: UserId, operation: SyncOperation, delay: Duration) {
        self.inner.scheduled_retries.fetch_add(1, Ordering::SeqCst);
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.inner.scheduled_retries.fetch_sub(1, Ordering::SeqCst);
            queue.enqueue_retry(operation);
            queue.drain(&user).await;
        });
    }

    async fn record_entity_error(&self, entity: &EntityRef, message: &str) -> Result<()> {
        if let Some(mut stored) = self.inner.store.get(entity.kind, &entity.id).await? {
            stored.sync_mut().record_error(message);
            self.inner.store.put(stored).await?;
        }
        Ok(())
    }

    async fn load(&self, entity: &EntityRef) -> Result<Entity> {
        self.inner
            .store
            .get(entity.kind, &entity.id)
            .await?
            .ok_or_else(|| Error::NotFound(entity.to_string()))
    }

    async fn remote_call<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, RemoteError>>,
    ) -> Result<T> {
        with_timeout(self.inner.settings.request_timeout, call).await
    }

    pub(crate) fn store(&self) -> &Arc<dyn EntityStore> {
        &self.inner.store
    }

    pub(crate) fn remote(&self) -> &Arc<dyn RemoteReplica> {
        &self.inner.remote
    }

    pub(crate) fn resolver(&self) -> &ConflictResolver {
        &self.inner.resolver
    }

    pub(crate) fn network(&self) -> &NetworkMonitor {
        &self.inner.network
    }

    pub(crate) fn emit(&self, kind: SyncEventKind) {
        self.inner.events.emit(kind);
    }

    fn publish_depth(&self) {
        self.emit(SyncEventKind::QueueChanged { depth: self.depth() });
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<SyncOperation>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bound a remote call by `timeout`
pub(crate) async fn with_timeout<T>(
    timeout: Duration,
    call: impl Future<Output = std::result::Result<T, RemoteError>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(RemoteError::Timeout(timeout).into()),
    }
}
