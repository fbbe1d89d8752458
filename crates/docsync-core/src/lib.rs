//! docsync-core - Core library for docsync
//!
//! This crate contains the document models, the collaborator contracts
//! (local store, remote replica, session, connectivity) and the sync engine
//! used by every docsync front end.

pub mod config;
pub mod error;
pub mod models;
pub mod monitor;
pub mod remote;
pub mod store;
pub mod sync;
pub mod util;

pub use config::SyncSettings;
pub use error::{Error, Result};
pub use models::{Document, DocumentUpdate, Entity, EntityId, EntityKind, Workspace};
pub use sync::{SyncService, SyncServiceBuilder};
