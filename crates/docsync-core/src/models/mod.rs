//! Data models for docsync

mod conflict;
mod document;
mod entity;
mod sync_meta;
mod workspace;

pub use conflict::{Conflict, ConflictId, Resolution};
pub use document::{Document, DocumentFields, DocumentUpdate};
pub use entity::{Entity, EntityId, EntityKind, EntityRef, TrackedField};
pub use sync_meta::SyncMetadata;
pub use workspace::{Workspace, WorkspaceFields};
