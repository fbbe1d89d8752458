//! In-memory entity store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{mark_deleted, sort_recent_first, EntityFilter, EntityStore};
use crate::error::{Error, Result};
use crate::models::{Entity, EntityId, EntityKind};

/// Thread-safe store backed by a hash map
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entities: Arc<Mutex<HashMap<(EntityKind, EntityId), Entity>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entities.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.lock().await.is_empty()
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn get(&self, kind: EntityKind, id: &EntityId) -> Result<Option<Entity>> {
        Ok(self.entities.lock().await.get(&(kind, id.clone())).cloned())
    }

    async fn put(&self, entity: Entity) -> Result<Entity> {
        let key = (entity.kind(), entity.id().clone());
        self.entities.lock().await.insert(key, entity.clone());
        Ok(entity)
    }

    async fn list(&self, kind: EntityKind, filter: &EntityFilter) -> Result<Vec<Entity>> {
        let guard = self.entities.lock().await;
        let mut entities = guard
            .values()
            .filter(|entity| entity.kind() == kind && filter.matches(entity))
            .cloned()
            .collect::<Vec<_>>();
        drop(guard);
        sort_recent_first(&mut entities);
        Ok(entities)
    }

    async fn soft_delete(&self, kind: EntityKind, id: &EntityId) -> Result<Entity> {
        let mut guard = self.entities.lock().await;
        let entity = guard
            .get_mut(&(kind, id.clone()))
            .filter(|entity| !entity.is_deleted())
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        mark_deleted(entity, crate::util::now_millis());
        Ok(entity.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, Workspace};

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryStore::new();
        let document = Document::new("Hello", None);
        let id = document.id.clone();

        store.put(document.into()).await.unwrap();

        let fetched = store.get(EntityKind::Document, &id).await.unwrap().unwrap();
        assert_eq!(fetched.id(), &id);
        assert!(store.get(EntityKind::Workspace, &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_scoped_by_kind_and_ordered() {
        let store = InMemoryStore::new();
        let mut older = Document::new("Older", None);
        older.updated_at = 10;
        let mut newer = Document::new("Newer", None);
        newer.updated_at = 20;

        store.put(older.into()).await.unwrap();
        store.put(newer.into()).await.unwrap();
        store.put(Workspace::new("Team").into()).await.unwrap();

        let documents = store
            .list(EntityKind::Document, &EntityFilter::default())
            .await
            .unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].as_document().unwrap().title, "Newer");
    }

    #[tokio::test]
    async fn test_soft_delete() {
        let store = InMemoryStore::new();
        let document = Document::new("To delete", None);
        let id = document.id.clone();
        store.put(document.into()).await.unwrap();

        let deleted = store.soft_delete(EntityKind::Document, &id).await.unwrap();
        assert!(deleted.is_deleted());

        let visible = store
            .list(EntityKind::Document, &EntityFilter::default())
            .await
            .unwrap();
        assert!(visible.is_empty());

        let again = store.soft_delete(EntityKind::Document, &id).await;
        assert!(matches!(again, Err(Error::NotFound(_))));
    }
}
