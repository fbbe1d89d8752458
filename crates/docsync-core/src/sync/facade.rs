//! Sync facade: the entry point the rest of the application uses.

use std::collections::HashMap;
use std::sync::Arc;

use super::conflict::ConflictResolver;
use super::events::{EventBus, SyncEvent};
use super::queue::OperationQueue;
use super::scheduler::{SyncReport, TriggerScheduler};
use super::status::{DetailedStatus, LocalCounts, StatusAggregator, StatusSubscription, SyncHealth};
use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::models::{
    ConflictId, Document, DocumentUpdate, Entity, EntityId, EntityKind, Resolution, Workspace,
};
use crate::monitor::{NetworkMonitor, SessionProvider, SessionSlot, UserId, VisibilityMonitor};
use crate::remote::RemoteReplica;
use crate::store::{EntityFilter, EntityStore};
use crate::util::{normalize_text_option, now_millis};

/// Wires the engine components to a store, a remote and the environment signals.
pub struct SyncServiceBuilder {
    store: Arc<dyn EntityStore>,
    remote: Arc<dyn RemoteReplica>,
    settings: SyncSettings,
    resolver: ConflictResolver,
    network: NetworkMonitor,
    visibility: VisibilityMonitor,
    session: Arc<dyn SessionProvider>,
}

impl SyncServiceBuilder {
    pub fn new(store: Arc<dyn EntityStore>, remote: Arc<dyn RemoteReplica>) -> Self {
        Self {
            store,
            remote,
            settings: SyncSettings::default(),
            resolver: ConflictResolver::new(),
            network: NetworkMonitor::default(),
            visibility: VisibilityMonitor::default(),
            session: Arc::new(SessionSlot::default()),
        }
    }

    #[must_use]
    pub fn settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn resolver(mut self, resolver: ConflictResolver) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn network(mut self, network: NetworkMonitor) -> Self {
        self.network = network;
        self
    }

    #[must_use]
    pub fn visibility(mut self, visibility: VisibilityMonitor) -> Self {
        self.visibility = visibility;
        self
    }

    #[must_use]
    pub fn session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = session;
        self
    }

    pub fn build(self) -> Result<SyncService> {
        self.settings.validate()?;

        let events = EventBus::new();
        let status = StatusAggregator::new(
            self.settings.clone(),
            self.network.clone(),
            Arc::clone(&self.session),
        );
        status.attach(&events);

        let queue = OperationQueue::new(
            Arc::clone(&self.store),
            self.remote,
            self.network.clone(),
            self.resolver,
            self.settings,
            events.clone(),
        );
        let scheduler = TriggerScheduler::new(
            queue.clone(),
            self.visibility,
            Arc::clone(&self.session),
        );

        Ok(SyncService {
            store: self.store,
            session: self.session,
            events,
            queue,
            scheduler,
            status,
        })
    }
}

/// Local-first document operations with background replication.
///
/// Writes always land in the local store first; sync work is scheduled
/// when a user is available, either passed explicitly or from the session.
pub struct SyncService {
    store: Arc<dyn EntityStore>,
    session: Arc<dyn SessionProvider>,
    events: EventBus,
    queue: OperationQueue,
    scheduler: TriggerScheduler,
    status: StatusAggregator,
}

impl SyncService {
    pub fn builder(
        store: Arc<dyn EntityStore>,
        remote: Arc<dyn RemoteReplica>,
    ) -> SyncServiceBuilder {
        SyncServiceBuilder::new(store, remote)
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub const fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    pub const fn scheduler(&self) -> &TriggerScheduler {
        &self.scheduler
    }

    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Create a document locally and schedule its upload
    pub async fn create_with_sync(
        &self,
        title: &str,
        workspace_id: Option<EntityId>,
        parent_id: Option<EntityId>,
        user: Option<&UserId>,
    ) -> Result<Document> {
        let title = normalize_text_option(Some(title.to_string()))
            .ok_or_else(|| Error::InvalidInput("title must not be empty".to_string()))?;
        let mut document = Document::new(title, workspace_id);
        document.parent_id = parent_id;

        let stored = self.store.put(document.into()).await?;
        tracing::debug!(entity_id = %stored.id(), "Document created");
        self.signal_change(&stored, user);
        into_document(stored)
    }

    /// Apply a partial update locally and schedule its upload
    pub async fn update_with_sync(
        &self,
        id: &EntityId,
        update: DocumentUpdate,
        user: Option<&UserId>,
    ) -> Result<Document> {
        let mut document = self
            .store
            .get(EntityKind::Document, id)
            .await?
            .and_then(Entity::into_document)
            .filter(|document| !document.is_deleted)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if !document.apply_update(update, now_millis()) {
            return Ok(document);
        }

        let stored = self.store.put(document.into()).await?;
        tracing::debug!(entity_id = %id, "Document updated");
        self.signal_change(&stored, user);
        into_document(stored)
    }

    pub async fn create_workspace_with_sync(
        &self,
        name: &str,
        user: Option<&UserId>,
    ) -> Result<Workspace> {
        let name = normalize_text_option(Some(name.to_string()))
            .ok_or_else(|| Error::InvalidInput("workspace name must not be empty".to_string()))?;
        let stored = self.store.put(Workspace::new(name).into()).await?;
        self.signal_change(&stored, user);
        stored
            .into_workspace()
            .ok_or_else(|| Error::Store("stored entity is not a workspace".to_string()))
    }

    /// Soft delete an entity; the deletion replicates like any other change
    pub async fn delete_with_sync(
        &self,
        kind: EntityKind,
        id: &EntityId,
        user: Option<&UserId>,
    ) -> Result<Entity> {
        let deleted = self.store.soft_delete(kind, id).await?;
        tracing::debug!(entity_id = %id, %kind, "Entity deleted");
        self.signal_change(&deleted, user);
        Ok(deleted)
    }

    /// Flush pending changes, reconcile with the remote and drain the queue.
    ///
    /// While offline the work stays queued; that is not an error.
    pub async fn force_sync_now(&self, user: &UserId) -> Result<SyncReport> {
        tracing::info!("Forcing sync");
        Ok(self.scheduler.force_sync(user).await)
    }

    /// Push data created before sign-in to the account of `user`
    pub async fn trigger_guest_migration(&self, user: &UserId) -> Result<SyncReport> {
        let local = self
            .store
            .list(EntityKind::Document, &EntityFilter::dirty())
            .await?
            .len();
        tracing::info!(documents = local, "Migrating local data to account");
        Ok(self.scheduler.force_sync(user).await)
    }

    pub async fn get_sync_status(&self, user: Option<&UserId>) -> Result<DetailedStatus> {
        self.refresh_local_counts().await?;
        let authenticated = user.is_some() || self.session.current_user().is_some();
        Ok(self.status.current_for(authenticated))
    }

    pub fn subscribe_to_status(
        &self,
        callback: impl Fn(&DetailedStatus) + Send + Sync + 'static,
    ) -> StatusSubscription {
        self.status.subscribe(callback)
    }

    pub async fn check_sync_health(&self, user: Option<&UserId>) -> Result<SyncHealth> {
        self.refresh_local_counts().await?;
        let authenticated = user.is_some() || self.session.current_user().is_some();
        Ok(self.status.health(authenticated, now_millis()))
    }

    /// Entities carrying unresolved conflicts
    pub async fn conflicted(&self) -> Result<Vec<Entity>> {
        let mut conflicted = Vec::new();
        for kind in EntityKind::ALL {
            conflicted.extend(
                self.store
                    .list(kind, &EntityFilter::all())
                    .await?
                    .into_iter()
                    .filter(|entity| entity.sync().has_unresolved_conflicts()),
            );
        }
        Ok(conflicted)
    }

    /// Resolve attached conflicts with per-conflict choices.
    ///
    /// Conflicts without a choice stay attached; once none remain the
    /// resolved values are applied and an upload is queued if needed.
    pub async fn resolve_conflicts(
        &self,
        kind: EntityKind,
        id: &EntityId,
        choices: &HashMap<ConflictId, Resolution>,
    ) -> Result<Entity> {
        let mut entity = self
            .store
            .get(kind, id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let conflicts = std::mem::take(&mut entity.sync_mut().conflicts);
        if conflicts.is_empty() {
            return Ok(entity);
        }
        if let Some(unknown) = choices
            .keys()
            .find(|choice| !conflicts.iter().any(|conflict| conflict.id == **choice))
        {
            return Err(Error::InvalidInput(format!("unknown conflict id: {unknown}")));
        }

        let outcome = self
            .queue
            .resolver()
            .resolve_with_choices(conflicts, choices);
        if outcome.is_complete() {
            return self.queue.apply_resolution(entity, &outcome.resolved).await;
        }

        let sync = entity.sync_mut();
        sync.conflicts = outcome.resolved;
        sync.conflicts.extend(outcome.remaining);
        self.store.put(entity).await
    }

    pub fn record_activity(&self) {
        self.scheduler.record_activity();
    }

    /// Start the background trigger loop
    pub fn start(&self) {
        self.scheduler.start();
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    /// Recent engine events, oldest first
    pub fn history(&self) -> Vec<SyncEvent> {
        self.status.history()
    }

    fn signal_change(&self, entity: &Entity, user: Option<&UserId>) {
        let session_user = self.session.current_user();
        let user = user.or(session_user.as_ref());
        if user.is_none() {
            tracing::debug!(entity_id = %entity.id(), "No user, change kept local");
            return;
        }
        self.scheduler.queue_document_sync(entity.entity_ref(), user);
    }

    async fn refresh_local_counts(&self) -> Result<()> {
        let mut counts = LocalCounts::default();
        for kind in EntityKind::ALL {
            for entity in self.store.list(kind, &EntityFilter::all()).await? {
                let unresolved = entity.sync().unresolved_conflicts();
                if unresolved > 0 {
                    counts.conflicts.insert(entity.entity_ref(), unresolved);
                }
                if let Some(error) = &entity.sync().sync_error {
                    counts.failing.insert(entity.entity_ref(), error.clone());
                }
                if entity.is_dirty() {
                    counts.dirty += 1;
                }
            }
        }
        self.status.refresh_local(counts);
        Ok(())
    }
}

fn into_document(entity: Entity) -> Result<Document> {
    entity
        .into_document()
        .ok_or_else(|| Error::Store("stored entity is not a document".to_string()))
}
