//! Sync bookkeeping shared by every synchronized entity

use serde::{Deserialize, Serialize};

use super::Conflict;

/// Replication state of one entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Time of the last successful reconciliation with the remote (Unix ms)
    #[serde(default)]
    pub last_sync_at: Option<i64>,
    /// Incremented on every successful sync, never decreases
    #[serde(default)]
    pub sync_version: u64,
    /// Identifier assigned by the remote replica on first upload
    #[serde(default)]
    pub cloud_id: Option<String>,
    /// Remote revision marker seen at the last reconciliation (Unix ms)
    #[serde(default)]
    pub remote_revision: Option<i64>,
    #[serde(default)]
    pub cloud_synced: bool,
    /// Last terminal sync error, cleared on success
    #[serde(default)]
    pub sync_error: Option<String>,
    /// Conflicts waiting for resolution
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
}

impl SyncMetadata {
    /// Point in time at which local and remote last agreed (0 when never synced)
    pub fn watermark(&self) -> i64 {
        self.last_sync_at.unwrap_or(0)
    }

    /// Whether a mutation at `updated_at` has not been reconciled yet
    pub fn is_dirty(&self, updated_at: i64) -> bool {
        self.last_sync_at
            .is_none_or(|last_sync_at| updated_at > last_sync_at)
    }

    /// Whether the remote has a revision this entity has not absorbed
    pub fn is_behind(&self, remote_updated_at: i64) -> bool {
        remote_updated_at > self.remote_revision.or(self.last_sync_at).unwrap_or(0)
    }

    pub fn unresolved_conflicts(&self) -> usize {
        self.conflicts.iter().filter(|conflict| !conflict.resolved).count()
    }

    pub fn has_unresolved_conflicts(&self) -> bool {
        self.unresolved_conflicts() > 0
    }

    /// Record a successful reconciliation
    pub fn mark_synced(&mut self, now: i64) {
        self.cloud_synced = true;
        self.sync_version += 1;
        self.last_sync_at = Some(now);
        self.sync_error = None;
    }

    /// Record a terminal sync failure
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.sync_error = Some(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_synced_entities_are_dirty() {
        let meta = SyncMetadata::default();
        assert!(meta.is_dirty(0));
        assert_eq!(meta.watermark(), 0);
    }

    #[test]
    fn mark_synced_bumps_version_and_clears_error() {
        let mut meta = SyncMetadata::default();
        meta.record_error("timeout");
        meta.mark_synced(1_000);
        meta.mark_synced(2_000);

        assert!(meta.cloud_synced);
        assert_eq!(meta.sync_version, 2);
        assert_eq!(meta.last_sync_at, Some(2_000));
        assert_eq!(meta.sync_error, None);
        assert!(!meta.is_dirty(2_000));
        assert!(meta.is_dirty(2_001));
    }

    #[test]
    fn behind_compares_against_known_remote_revision() {
        let mut meta = SyncMetadata::default();
        assert!(meta.is_behind(1));

        meta.mark_synced(1_000);
        assert!(meta.is_behind(1_500));

        meta.remote_revision = Some(2_000);
        assert!(!meta.is_behind(1_500));
        assert!(!meta.is_behind(2_000));
        assert!(meta.is_behind(2_001));
    }
}
