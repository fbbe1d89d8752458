use async_trait::async_trait;
use docsync_core::models::EntityKind;
use docsync_core::monitor::UserId;
use docsync_core::remote::{RemoteDraft, RemoteError, RemoteRecord, RemoteReplica, RemoteResult};
use serde_json::Value;

/// Stand-in replica when no remote is configured; every call reports offline
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalOnlyRemote;

#[async_trait]
impl RemoteReplica for LocalOnlyRemote {
    async fn create(&self, _user: &UserId, _draft: &RemoteDraft) -> RemoteResult<RemoteRecord> {
        Err(RemoteError::Offline)
    }

    async fn update_by_id(
        &self,
        _user: &UserId,
        _kind: EntityKind,
        _remote_id: &str,
        _fields: &Value,
    ) -> RemoteResult<RemoteRecord> {
        Err(RemoteError::Offline)
    }

    async fn get_by_id(
        &self,
        _user: &UserId,
        _kind: EntityKind,
        _remote_id: &str,
    ) -> RemoteResult<Option<RemoteRecord>> {
        Err(RemoteError::Offline)
    }

    async fn list(
        &self,
        _user: &UserId,
        _kind: EntityKind,
        _updated_since: Option<i64>,
    ) -> RemoteResult<Vec<RemoteRecord>> {
        Err(RemoteError::Offline)
    }
}
