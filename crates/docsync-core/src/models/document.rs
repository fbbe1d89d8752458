//! Document model

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::decode_field;
use super::{EntityId, SyncMetadata, TrackedField};
use crate::error::Result;

/// The unit of synchronization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier, shared with the remote replica
    pub id: EntityId,
    pub title: String,
    /// Serialized editor content, compared as a single value
    pub content: String,
    pub workspace_id: Option<EntityId>,
    /// Hierarchy parent
    pub parent_id: Option<EntityId>,
    pub is_favorite: bool,
    pub font: Option<String>,
    pub icon: Option<String>,
    pub cover_image: Option<String>,
    /// Last time the document was opened (Unix ms)
    pub last_opened_at: Option<i64>,
    /// Soft delete flag for sync
    pub is_deleted: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last local mutation (Unix ms)
    pub updated_at: i64,
    #[serde(default)]
    pub sync: SyncMetadata,
}

impl Document {
    pub const TRACKED_FIELDS: &'static [TrackedField] = &[
        TrackedField::Title,
        TrackedField::Content,
        TrackedField::Font,
        TrackedField::Icon,
        TrackedField::CoverImage,
        TrackedField::Favorite,
        TrackedField::LastOpenedAt,
        TrackedField::WorkspaceId,
        TrackedField::ParentId,
        TrackedField::Deleted,
    ];

    /// Create a new, never-synced document
    #[must_use]
    pub fn new(title: impl Into<String>, workspace_id: Option<EntityId>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: EntityId::new(),
            title: title.into(),
            content: String::new(),
            workspace_id,
            parent_id: None,
            is_favorite: false,
            font: None,
            icon: None,
            cover_image: None,
            last_opened_at: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
            sync: SyncMetadata::default(),
        }
    }

    /// Apply a partial update, returning whether anything changed.
    ///
    /// `updated_at` moves to `now` only when a field actually changed, and
    /// always lands after the last sync so the change reads as dirty.
    pub fn apply_update(&mut self, update: DocumentUpdate, now: i64) -> bool {
        let mut changed = false;

        if let Some(title) = update.title {
            changed |= replace(&mut self.title, title);
        }
        if let Some(content) = update.content {
            changed |= replace(&mut self.content, content);
        }
        if let Some(workspace_id) = update.workspace_id {
            changed |= replace(&mut self.workspace_id, Some(workspace_id));
        }
        if let Some(parent_id) = update.parent_id {
            changed |= replace(&mut self.parent_id, Some(parent_id));
        }
        if let Some(is_favorite) = update.is_favorite {
            changed |= replace(&mut self.is_favorite, is_favorite);
        }
        if let Some(font) = update.font {
            changed |= replace(&mut self.font, Some(font));
        }
        if let Some(icon) = update.icon {
            changed |= replace(&mut self.icon, Some(icon));
        }
        if let Some(cover_image) = update.cover_image {
            changed |= replace(&mut self.cover_image, Some(cover_image));
        }
        if let Some(last_opened_at) = update.last_opened_at {
            changed |= replace(&mut self.last_opened_at, Some(last_opened_at));
        }

        if changed {
            self.updated_at = now
                .max(self.updated_at)
                .max(self.sync.watermark() + 1);
        }
        changed
    }

    pub(super) fn field_value(&self, field: TrackedField) -> Option<Value> {
        let value = match field {
            TrackedField::Title => Value::from(self.title.clone()),
            TrackedField::Content => Value::from(self.content.clone()),
            TrackedField::Font => Value::from(self.font.clone()),
            TrackedField::Icon => Value::from(self.icon.clone()),
            TrackedField::CoverImage => Value::from(self.cover_image.clone()),
            TrackedField::Favorite => Value::from(self.is_favorite),
            TrackedField::LastOpenedAt => Value::from(self.last_opened_at),
            TrackedField::WorkspaceId => Value::from(self.workspace_id.as_ref().map(EntityId::as_str)),
            TrackedField::ParentId => Value::from(self.parent_id.as_ref().map(EntityId::as_str)),
            TrackedField::Deleted => Value::from(self.is_deleted),
            TrackedField::Name => return None,
        };
        Some(value)
    }

    pub(super) fn set_field_value(&mut self, field: TrackedField, value: &Value) -> Result<()> {
        match field {
            TrackedField::Title => self.title = decode_field(field, value)?,
            TrackedField::Content => self.content = decode_field(field, value)?,
            TrackedField::Font => self.font = decode_field(field, value)?,
            TrackedField::Icon => self.icon = decode_field(field, value)?,
            TrackedField::CoverImage => self.cover_image = decode_field(field, value)?,
            TrackedField::Favorite => self.is_favorite = decode_field(field, value)?,
            TrackedField::LastOpenedAt => self.last_opened_at = decode_field(field, value)?,
            TrackedField::WorkspaceId => self.workspace_id = decode_field(field, value)?,
            TrackedField::ParentId => self.parent_id = decode_field(field, value)?,
            TrackedField::Deleted => self.is_deleted = decode_field(field, value)?,
            TrackedField::Name => {}
        }
        Ok(())
    }

    /// Remote wire shape of this document
    pub fn fields(&self) -> DocumentFields {
        DocumentFields {
            title: self.title.clone(),
            content: self.content.clone(),
            workspace_id: self.workspace_id.clone(),
            parent_id: self.parent_id.clone(),
            is_favorite: self.is_favorite,
            font: self.font.clone(),
            icon: self.icon.clone(),
            cover_image: self.cover_image.clone(),
            last_opened_at: self.last_opened_at,
            is_deleted: self.is_deleted,
        }
    }

    pub(super) fn absorb_fields(&mut self, fields: DocumentFields) {
        self.title = fields.title;
        self.content = fields.content;
        self.workspace_id = fields.workspace_id;
        self.parent_id = fields.parent_id;
        self.is_favorite = fields.is_favorite;
        self.font = fields.font;
        self.icon = fields.icon;
        self.cover_image = fields.cover_image;
        self.last_opened_at = fields.last_opened_at;
        self.is_deleted = fields.is_deleted;
    }

    pub(super) fn from_fields(id: EntityId, fields: DocumentFields, revision: i64) -> Self {
        let mut document = Self {
            id,
            title: String::new(),
            content: String::new(),
            workspace_id: None,
            parent_id: None,
            is_favorite: false,
            font: None,
            icon: None,
            cover_image: None,
            last_opened_at: None,
            is_deleted: false,
            created_at: revision,
            updated_at: revision,
            sync: SyncMetadata::default(),
        };
        document.absorb_fields(fields);
        document
    }

    /// Get first line of the title as a preview, truncated to `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        self.title
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(max_len)
            .collect()
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

/// Document fields as exchanged with the remote replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFields {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub workspace_id: Option<EntityId>,
    #[serde(default)]
    pub parent_id: Option<EntityId>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub font: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub last_opened_at: Option<i64>,
    #[serde(default)]
    pub is_deleted: bool,
}

/// Partial update produced by the editing layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub workspace_id: Option<EntityId>,
    pub parent_id: Option<EntityId>,
    pub is_favorite: Option<bool>,
    pub font: Option<String>,
    pub icon: Option<String>,
    pub cover_image: Option<String>,
    pub last_opened_at: Option<i64>,
}

impl DocumentUpdate {
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    #[must_use]
    pub const fn favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = Some(is_favorite);
        self
    }

    #[must_use]
    pub fn font(mut self, font: impl Into<String>) -> Self {
        self.font = Some(font.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
