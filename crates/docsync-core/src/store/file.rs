//! JSON file backed entity store.
//!
//! The whole store is kept in memory and rewritten on every mutation. Writes
//! go to a sibling temp file first and are renamed into place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{mark_deleted, sort_recent_first, EntityFilter, EntityStore};
use crate::error::{Error, Result};
use crate::models::{Entity, EntityId, EntityKind};

const STORE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default = "default_format_version")]
    version: u32,
    #[serde(default)]
    entities: Vec<Entity>,
}

const fn default_format_version() -> u32 {
    STORE_FORMAT_VERSION
}

type EntityMap = BTreeMap<(EntityKind, EntityId), Entity>;

/// Entity store persisted as a single JSON document
#[derive(Clone)]
pub struct FileStore {
    path: PathBuf,
    entities: Arc<Mutex<EntityMap>>,
}

impl FileStore {
    /// Open the store at `path`, creating parent directories when missing
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let entities = Self::load(&path)?;
        tracing::debug!(
            path = %path.display(),
            count = entities.len(),
            "Opened file store"
        );

        Ok(Self {
            path,
            entities: Arc::new(Mutex::new(entities)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<EntityMap> {
        if !path.exists() {
            return Ok(EntityMap::new());
        }

        let raw = std::fs::read_to_string(path)?;
        if raw.trim().is_empty() {
            return Ok(EntityMap::new());
        }

        let file: StoreFile = serde_json::from_str(&raw)?;
        if file.version != STORE_FORMAT_VERSION {
            return Err(Error::Store(format!(
                "unsupported store format version {} (expected {STORE_FORMAT_VERSION})",
                file.version
            )));
        }

        Ok(file
            .entities
            .into_iter()
            .map(|entity| ((entity.kind(), entity.id().clone()), entity))
            .collect())
    }

    fn persist(&self, entities: &EntityMap) -> Result<()> {
        let file = StoreFile {
            version: STORE_FORMAT_VERSION,
            entities: entities.values().cloned().collect(),
        };
        let serialized = serde_json::to_string_pretty(&file)?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serialized)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl EntityStore for FileStore {
    async fn get(&self, kind: EntityKind, id: &EntityId) -> Result<Option<Entity>> {
        Ok(self.entities.lock().await.get(&(kind, id.clone())).cloned())
    }

    async fn put(&self, entity: Entity) -> Result<Entity> {
        let mut guard = self.entities.lock().await;
        let mut next = guard.clone();
        next.insert((entity.kind(), entity.id().clone()), entity.clone());
        self.persist(&next)?;
        *guard = next;
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
        let key = (kind, id.clone());
        let mut deleted = guard
            .get(&key)
            .filter(|entity| !entity.is_deleted())
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        mark_deleted(&mut deleted, crate::util::now_millis());

        let mut next = guard.clone();
        next.insert(key, deleted.clone());
        self.persist(&next)?;
        *guard = next;
        Ok(deleted)
    }
}
