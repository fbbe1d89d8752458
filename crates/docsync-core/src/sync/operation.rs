//! Queue work items

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{Entity, EntityRef};
use crate::util::now_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Upload,
    Download,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity used for coalescing: one queued operation per entity and kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    pub kind: OperationKind,
    pub entity: EntityRef,
}

/// A pending upload or download of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOperation {
    pub kind: OperationKind,
    pub entity: EntityRef,
    /// Remote identifier for downloads of records not yet linked locally
    pub remote_id: Option<String>,
    /// Snapshot of the entity at enqueue time (uploads only)
    pub payload: Option<Entity>,
    /// Unix ms
    pub enqueued_at: i64,
    /// Failed attempts so far
    pub retry_count: u32,
}

impl SyncOperation {
    pub fn upload(entity: Entity) -> Self {
        Self {
            kind: OperationKind::Upload,
            entity: entity.entity_ref(),
            remote_id: None,
            payload: Some(entity),
            enqueued_at: now_millis(),
            retry_count: 0,
        }
    }

    pub fn download(entity: EntityRef, remote_id: Option<String>) -> Self {
        Self {
            kind: OperationKind::Download,
            entity,
            remote_id,
            payload: None,
            enqueued_at: now_millis(),
            retry_count: 0,
        }
    }

    pub fn key(&self) -> OperationKey {
        OperationKey {
            kind: self.kind,
            entity: self.entity.clone(),
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.entity)
    }
}
