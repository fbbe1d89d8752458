//! Workspace model

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::decode_field;
use super::{EntityId, SyncMetadata, TrackedField};
use crate::error::Result;

/// Container for documents, synchronized like a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: EntityId,
    pub name: String,
    pub icon: Option<String>,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub sync: SyncMetadata,
}

impl Workspace {
    pub const TRACKED_FIELDS: &'static [TrackedField] =
        &[TrackedField::Name, TrackedField::Icon, TrackedField::Deleted];

    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: EntityId::new(),
            name: name.into(),
            icon: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
            sync: SyncMetadata::default(),
        }
    }

    pub(super) fn field_value(&self, field: TrackedField) -> Option<Value> {
        match field {
            TrackedField::Name => Some(Value::from(self.name.clone())),
            TrackedField::Icon => Some(Value::from(self.icon.clone())),
            TrackedField::Deleted => Some(Value::from(self.is_deleted)),
            _ => None,
        }
    }

    pub(super) fn set_field_value(&mut self, field: TrackedField, value: &Value) -> Result<()> {
        match field {
            TrackedField::Name => self.name = decode_field(field, value)?,
            TrackedField::Icon => self.icon = decode_field(field, value)?,
            TrackedField::Deleted => self.is_deleted = decode_field(field, value)?,
            _ => {}
        }
        Ok(())
    }

    pub fn fields(&self) -> WorkspaceFields {
        WorkspaceFields {
            name: self.name.clone(),
            icon: self.icon.clone(),
            is_deleted: self.is_deleted,
        }
    }

    pub(super) fn absorb_fields(&mut self, fields: WorkspaceFields) {
        self.name = fields.name;
        self.icon = fields.icon;
        self.is_deleted = fields.is_deleted;
    }

    pub(super) fn from_fields(id: EntityId, fields: WorkspaceFields, revision: i64) -> Self {
        Self {
            id,
            name: fields.name,
            icon: fields.icon,
            is_deleted: fields.is_deleted,
            created_at: revision,
            updated_at: revision,
            sync: SyncMetadata::default(),
        }
    }
}

/// Workspace fields as exchanged with the remote replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceFields {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn workspace_tracks_its_wire_fields() {
        let workspace = Workspace::new("Personal");
        assert_eq!(workspace.field_value(TrackedField::Name), Some(json!("Personal")));
        assert_eq!(workspace.field_value(TrackedField::Icon), Some(json!(null)));
        assert_eq!(workspace.field_value(TrackedField::Deleted), Some(json!(false)));
        assert_eq!(workspace.field_value(TrackedField::Content), None);
    }

    #[test]
    fn from_fields_uses_revision_for_timestamps() {
        let fields = WorkspaceFields {
            name: "Team".to_string(),
            icon: Some("🚀".to_string()),
            is_deleted: false,
        };
        let workspace = Workspace::from_fields(EntityId::from("ws-1"), fields, 42);
        assert_eq!(workspace.created_at, 42);
        assert_eq!(workspace.updated_at, 42);
        assert_eq!(workspace.name, "Team");
    }
}
