//! Local entity store contract and bundled implementations

mod file;
mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Entity, EntityId, EntityKind};

pub use file::FileStore;
pub use memory::InMemoryStore;

/// Criteria for [`EntityStore::list`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityFilter {
    /// Include soft-deleted entities
    pub include_deleted: bool,
    /// Only entities with local changes the remote has not acknowledged
    pub dirty_only: bool,
    /// Only documents belonging to this workspace
    pub workspace_id: Option<EntityId>,
}

impl EntityFilter {
    pub fn all() -> Self {
        Self {
            include_deleted: true,
            ..Self::default()
        }
    }

    /// Entities that still need an upload, deleted ones included
    pub fn dirty() -> Self {
        Self {
            include_deleted: true,
            dirty_only: true,
            workspace_id: None,
        }
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        if !self.include_deleted && entity.is_deleted() {
            return false;
        }
        if self.dirty_only && !entity.is_dirty() {
            return false;
        }
        if let Some(workspace_id) = &self.workspace_id {
            return entity
                .as_document()
                .is_some_and(|document| document.workspace_id.as_ref() == Some(workspace_id));
        }
        true
    }
}

/// Key-value store holding the local copy of every entity.
///
/// `put` is a raw write: it never touches timestamps or sync metadata.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get(&self, kind: EntityKind, id: &EntityId) -> Result<Option<Entity>>;

    async fn put(&self, entity: Entity) -> Result<Entity>;

    /// Entities of `kind` matching `filter`, most recently updated first
    async fn list(&self, kind: EntityKind, filter: &EntityFilter) -> Result<Vec<Entity>>;

    /// Mark an entity deleted and bump its `updated_at`
    async fn soft_delete(&self, kind: EntityKind, id: &EntityId) -> Result<Entity>;
}

fn sort_recent_first(entities: &mut [Entity]) {
    entities.sort_by(|a, b| {
        b.updated_at()
            .cmp(&a.updated_at())
            .then_with(|| a.id().cmp(b.id()))
    });
}

fn mark_deleted(entity: &mut Entity, now: i64) {
    match entity {
        Entity::Document(document) => document.is_deleted = true,
        Entity::Workspace(workspace) => workspace.is_deleted = true,
    }
    let updated_at = now
        .max(entity.updated_at())
        .max(entity.sync().watermark() + 1);
    entity.set_updated_at(updated_at);
}
