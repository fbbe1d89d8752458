//! Entity identity and the kind-agnostic view the sync engine works on

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Document, SyncMetadata, Workspace};
use crate::error::{Error, Result};

/// Opaque entity identifier, stable across the local store and the remote replica
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create a new unique, time-sortable identifier (UUID v7)
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Kinds of synchronized entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Document,
    Workspace,
}

impl EntityKind {
    pub const ALL: [Self; 2] = [Self::Workspace, Self::Document];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Workspace => "workspace",
        }
    }

    /// Collection name used by the remote replica
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Document => "documents",
            Self::Workspace => "workspaces",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document" | "documents" | "doc" => Ok(Self::Document),
            "workspace" | "workspaces" => Ok(Self::Workspace),
            other => Err(Error::InvalidInput(format!("unknown entity kind: {other}"))),
        }
    }
}

/// Address of one entity: its kind plus its identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<EntityId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn document(id: impl Into<EntityId>) -> Self {
        Self::new(EntityKind::Document, id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Fields compared during conflict detection.
///
/// Every field exchanged with the remote replica is tracked, so a resolved
/// entity never carries a stale value for an unlisted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedField {
    Title,
    Name,
    Content,
    Font,
    Icon,
    CoverImage,
    Favorite,
    LastOpenedAt,
    WorkspaceId,
    ParentId,
    Deleted,
}

impl TrackedField {
    pub const ALL: [Self; 11] = [
        Self::Title,
        Self::Name,
        Self::Content,
        Self::Font,
        Self::Icon,
        Self::CoverImage,
        Self::Favorite,
        Self::LastOpenedAt,
        Self::WorkspaceId,
        Self::ParentId,
        Self::Deleted,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Name => "name",
            Self::Content => "content",
            Self::Font => "font",
            Self::Icon => "icon",
            Self::CoverImage => "cover_image",
            Self::Favorite => "favorite",
            Self::LastOpenedAt => "last_opened_at",
            Self::WorkspaceId => "workspace_id",
            Self::ParentId => "parent_id",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for TrackedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackedField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == wanted)
            .ok_or_else(|| Error::InvalidInput(format!("unknown field: {s}")))
    }
}

/// A synchronized record of any kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Document(Document),
    Workspace(Workspace),
}

impl Entity {
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Document(_) => EntityKind::Document,
            Self::Workspace(_) => EntityKind::Workspace,
        }
    }

    pub const fn id(&self) -> &EntityId {
        match self {
            Self::Document(document) => &document.id,
            Self::Workspace(workspace) => &workspace.id,
        }
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind(), self.id().clone())
    }

    pub const fn updated_at(&self) -> i64 {
        match self {
            Self::Document(document) => document.updated_at,
            Self::Workspace(workspace) => workspace.updated_at,
        }
    }

    pub fn set_updated_at(&mut self, updated_at: i64) {
        match self {
            Self::Document(document) => document.updated_at = updated_at,
            Self::Workspace(workspace) => workspace.updated_at = updated_at,
        }
    }

    pub const fn is_deleted(&self) -> bool {
        match self {
            Self::Document(document) => document.is_deleted,
            Self::Workspace(workspace) => workspace.is_deleted,
        }
    }

    pub const fn sync(&self) -> &SyncMetadata {
        match self {
            Self::Document(document) => &document.sync,
            Self::Workspace(workspace) => &workspace.sync,
        }
    }

    pub fn sync_mut(&mut self) -> &mut SyncMetadata {
        match self {
            Self::Document(document) => &mut document.sync,
            Self::Workspace(workspace) => &mut workspace.sync,
        }
    }

    /// Local changes exist that the remote has not acknowledged
    pub fn is_dirty(&self) -> bool {
        self.sync().is_dirty(self.updated_at())
    }

    pub const fn tracked_fields(&self) -> &'static [TrackedField] {
        match self {
            Self::Document(_) => Document::TRACKED_FIELDS,
            Self::Workspace(_) => Workspace::TRACKED_FIELDS,
        }
    }

    /// Current value of a tracked field, `None` when the kind has no such field
    pub fn field_value(&self, field: TrackedField) -> Option<Value> {
        match self {
            Self::Document(document) => document.field_value(field),
            Self::Workspace(workspace) => workspace.field_value(field),
        }
    }

    pub fn set_field_value(&mut self, field: TrackedField, value: &Value) -> Result<()> {
        match self {
            Self::Document(document) => document.set_field_value(field, value),
            Self::Workspace(workspace) => workspace.set_field_value(field, value),
        }
    }

    /// Field map sent to the remote replica
    pub fn wire_fields(&self) -> Result<Value> {
        let fields = match self {
            Self::Document(document) => serde_json::to_value(document.fields())?,
            Self::Workspace(workspace) => serde_json::to_value(workspace.fields())?,
        };
        Ok(fields)
    }

    /// Copy of this entity carrying the remote replica's field values and revision.
    ///
    /// Local sync metadata is preserved.
    pub fn with_remote_fields(&self, fields: &Value, revision: i64) -> Result<Self> {
        let mut merged = self.clone();
        match &mut merged {
            Self::Document(document) => {
                document.absorb_fields(serde_json::from_value(fields.clone())?);
            }
            Self::Workspace(workspace) => {
                workspace.absorb_fields(serde_json::from_value(fields.clone())?);
            }
        }
        merged.set_updated_at(revision);
        Ok(merged)
    }

    /// Build a local entity from a remote record that has no local counterpart
    pub fn from_remote_fields(
        kind: EntityKind,
        id: EntityId,
        fields: &Value,
        revision: i64,
    ) -> Result<Self> {
        let entity = match kind {
            EntityKind::Document => Self::Document(Document::from_fields(
                id,
                serde_json::from_value(fields.clone())?,
                revision,
            )),
            EntityKind::Workspace => Self::Workspace(Workspace::from_fields(
                id,
                serde_json::from_value(fields.clone())?,
                revision,
            )),
        };
        Ok(entity)
    }

    pub const fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Document(document) => Some(document),
            Self::Workspace(_) => None,
        }
    }

    pub fn into_document(self) -> Option<Document> {
        match self {
            Self::Document(document) => Some(document),
            Self::Workspace(_) => None,
        }
    }

    pub fn into_workspace(self) -> Option<Workspace> {
        match self {
            Self::Workspace(workspace) => Some(workspace),
            Self::Document(_) => None,
        }
    }
}

impl From<Document> for Entity {
    fn from(value: Document) -> Self {
        Self::Document(value)
    }
}

impl From<Workspace> for Entity {
    fn from(value: Workspace) -> Self {
        Self::Workspace(value)
    }
}

/// Decode a field value, reporting the field on type mismatch.
pub(super) fn decode_field<T: serde::de::DeserializeOwned>(
    field: TrackedField,
    value: &Value,
) -> Result<T> {
    serde_json::from_value(value.clone())
        .map_err(|error| Error::InvalidInput(format!("invalid value for {field}: {error}")))
}
