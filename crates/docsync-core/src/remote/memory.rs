//! In-process remote replica with failure injection.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{RemoteDraft, RemoteError, RemoteRecord, RemoteReplica, RemoteResult};
use crate::models::EntityKind;
use crate::monitor::UserId;
use crate::util::now_millis;

/// Remote calls counted by [`InMemoryRemote`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCall {
    Create,
    Update,
    Get,
    List,
}

type FailureFactory = Arc<dyn Fn() -> RemoteError + Send + Sync>;

#[derive(Default)]
struct RemoteState {
    records: HashMap<(EntityKind, String), RemoteRecord>,
    calls: HashMap<RemoteCall, usize>,
    queued_failures: VecDeque<RemoteError>,
    persistent_failure: Option<FailureFactory>,
    latency: Option<Duration>,
    last_stamp: i64,
}

impl RemoteState {
    fn stamp(&mut self) -> i64 {
        self.last_stamp = now_millis().max(self.last_stamp + 1);
        self.last_stamp
    }

    fn take_failure(&mut self) -> Option<RemoteError> {
        self.queued_failures
            .pop_front()
            .or_else(|| self.persistent_failure.as_ref().map(|factory| factory()))
    }
}

/// Remote replica held in memory.
///
/// Shared between clones, so a test can keep a handle while the sync engine
/// owns another. Records are stamped with a strictly increasing revision.
#[derive(Clone, Default)]
pub struct InMemoryRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call with `error`. Failures queue up in order.
    pub async fn push_failure(&self, error: RemoteError) {
        self.state.lock().await.queued_failures.push_back(error);
    }

    /// Fail every call until [`Self::clear_failures`] is called.
    pub async fn fail_always(&self, factory: impl Fn() -> RemoteError + Send + Sync + 'static) {
        self.state.lock().await.persistent_failure = Some(Arc::new(factory));
    }

    pub async fn clear_failures(&self) {
        let mut state = self.state.lock().await;
        state.queued_failures.clear();
        state.persistent_failure = None;
    }

    /// Delay every call by `latency` before it touches the records.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().await.latency = latency;
    }

    pub async fn calls(&self, call: RemoteCall) -> usize {
        self.state
            .lock()
            .await
            .calls
            .get(&call)
            .copied()
            .unwrap_or(0)
    }

    pub async fn total_calls(&self) -> usize {
        self.state.lock().await.calls.values().sum()
    }

    pub async fn records(&self, kind: EntityKind) -> Vec<RemoteRecord> {
        let state = self.state.lock().await;
        let mut records: Vec<_> = state
            .records
            .values()
            .filter(|record| record.kind == kind)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.updated_at);
        records
    }

    pub async fn record(&self, kind: EntityKind, remote_id: &str) -> Option<RemoteRecord> {
        self.state
            .lock()
            .await
            .records
            .get(&(kind, remote_id.to_string()))
            .cloned()
    }

    /// Write a record as another device would, bypassing counters and failures.
    pub async fn seed(&self, mut record: RemoteRecord) -> RemoteRecord {
        let mut state = self.state.lock().await;
        if record.updated_at <= 0 {
            record.updated_at = state.stamp();
        } else {
            state.last_stamp = state.last_stamp.max(record.updated_at);
        }
        state
            .records
            .insert((record.kind, record.id.clone()), record.clone());
        record
    }

    /// Overwrite one field of an existing record and bump its revision.
    pub async fn edit_field(
        &self,
        kind: EntityKind,
        remote_id: &str,
        key: &str,
        value: Value,
    ) -> Option<RemoteRecord> {
        let mut state = self.state.lock().await;
        let stamp = state.stamp();
        let record = state.records.get_mut(&(kind, remote_id.to_string()))?;
        if let Value::Object(fields) = &mut record.fields {
            fields.insert(key.to_string(), value);
        }
        record.updated_at = stamp;
        Some(record.clone())
    }

    async fn begin(&self, call: RemoteCall) -> RemoteResult<()> {
        let latency = {
            let mut state = self.state.lock().await;
            *state.calls.entry(call).or_default() += 1;
            if let Some(error) = state.take_failure() {
                return Err(error);
            }
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteReplica for InMemoryRemote {
    async fn create(&self, _user: &UserId, draft: &RemoteDraft) -> RemoteResult<RemoteRecord> {
        self.begin(RemoteCall::Create).await?;
        let mut state = self.state.lock().await;
        let record = RemoteRecord {
            id: Uuid::now_v7().to_string(),
            kind: draft.kind,
            local_id: draft.local_id.clone(),
            updated_at: state.stamp(),
            fields: draft.fields.clone(),
        };
        state
            .records
            .insert((record.kind, record.id.clone()), record.clone());
        Ok(record)
    }

    async fn update_by_id(
        &self,
        _user: &UserId,
        kind: EntityKind,
        remote_id: &str,
        fields: &Value,
    ) -> RemoteResult<RemoteRecord> {
        self.begin(RemoteCall::Update).await?;
        let mut state = self.state.lock().await;
        let stamp = state.stamp();
        let record = state
            .records
            .get_mut(&(kind, remote_id.to_string()))
            .ok_or_else(|| RemoteError::NotFound(format!("{kind}/{remote_id}")))?;
        record.fields = fields.clone();
        record.updated_at = stamp;
        Ok(record.clone())
    }

    async fn get_by_id(
        &self,
        _user: &UserId,
        kind: EntityKind,
        remote_id: &str,
    ) -> RemoteResult<Option<RemoteRecord>> {
        self.begin(RemoteCall::Get).await?;
        Ok(self.record(kind, remote_id).await)
    }

    async fn list(
        &self,
        _user: &UserId,
        kind: EntityKind,
        updated_since: Option<i64>,
    ) -> RemoteResult<Vec<RemoteRecord>> {
        self.begin(RemoteCall::List).await?;
        let mut records = self.records(kind).await;
        if let Some(since) = updated_since {
            records.retain(|record| record.updated_at > since);
        }
        Ok(records)
    }
}
