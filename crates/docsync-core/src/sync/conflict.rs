//! Field-level conflict detection and resolution.
//!
//! The resolver is stateless: it compares snapshots and computes resolved
//! values. The queue decides when to persist them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::models::{Conflict, ConflictId, Entity, Resolution, TrackedField};

/// How a conflicting field is reconciled automatically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Newer timestamp wins
    Latest,
    /// Type-specific merge: booleans OR, strings keep the longer value
    Merge,
    /// Left for the user
    Manual,
}

impl MergeStrategy {
    /// Built-in strategy for a field
    pub const fn default_for(field: TrackedField) -> Self {
        match field {
            TrackedField::Content => Self::Manual,
            TrackedField::Favorite | TrackedField::Deleted => Self::Merge,
            TrackedField::Title
            | TrackedField::Name
            | TrackedField::Font
            | TrackedField::Icon
            | TrackedField::CoverImage
            | TrackedField::LastOpenedAt
            | TrackedField::WorkspaceId
            | TrackedField::ParentId => Self::Latest,
        }
    }
}

/// Outcome of an automatic or user-driven resolution pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionOutcome {
    /// Conflicts with a value ready to apply
    pub resolved: Vec<Conflict>,
    /// Conflicts still waiting for a user decision
    pub remaining: Vec<Conflict>,
}

impl ResolutionOutcome {
    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    overrides: HashMap<TrackedField, MergeStrategy>,
}

impl ConflictResolver {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_strategy(mut self, field: TrackedField, strategy: MergeStrategy) -> Self {
        self.overrides.insert(field, strategy);
        self
    }

    pub fn strategy_for(&self, field: TrackedField) -> MergeStrategy {
        self.overrides
            .get(&field)
            .copied()
            .unwrap_or_else(|| MergeStrategy::default_for(field))
    }

    /// Fields that diverged on both sides since `watermark`.
    ///
    /// A side counts as changed when its `updated_at` is strictly after the
    /// watermark; a one-sided change is never a conflict.
    pub fn detect(&self, local: &Entity, remote: &Entity, watermark: i64) -> Vec<Conflict> {
        let local_changed = local.updated_at() > watermark;
        let remote_changed = remote.updated_at() > watermark;
        if !(local_changed && remote_changed) {
            return Vec::new();
        }

        local
            .tracked_fields()
            .iter()
            .filter_map(|&field| {
                let local_value = local.field_value(field).unwrap_or(Value::Null);
                let remote_value = remote.field_value(field).unwrap_or(Value::Null);
                (local_value != remote_value).then(|| {
                    Conflict::new(
                        field,
                        local_value,
                        remote_value,
                        local.updated_at(),
                        remote.updated_at(),
                    )
                })
            })
            .collect()
    }

    /// Automatic resolution of one conflict, `None` when it needs the user
    pub fn resolve(&self, conflict: &Conflict) -> Option<(Resolution, Value)> {
        match self.strategy_for(conflict.field) {
            MergeStrategy::Latest => Some(latest(conflict)),
            MergeStrategy::Merge => {
                Some(merge(conflict).map_or_else(|| latest(conflict), |value| (Resolution::Merge, value)))
            }
            MergeStrategy::Manual => None,
        }
    }

    /// Split a batch into automatically resolved and manual conflicts
    pub fn auto_resolve(&self, conflicts: Vec<Conflict>) -> ResolutionOutcome {
        let mut outcome = ResolutionOutcome::default();
        for mut conflict in conflicts {
            if conflict.resolved {
                outcome.resolved.push(conflict);
                continue;
            }
            match self.resolve(&conflict) {
                Some((resolution, value)) => {
                    conflict.resolve(resolution, value);
                    outcome.resolved.push(conflict);
                }
                None => {
                    conflict.defer();
                    outcome.remaining.push(conflict);
                }
            }
        }
        outcome
    }

    /// Apply user choices by conflict id; conflicts without a choice remain
    pub fn resolve_with_choices(
        &self,
        conflicts: Vec<Conflict>,
        choices: &HashMap<ConflictId, Resolution>,
    ) -> ResolutionOutcome {
        let mut outcome = ResolutionOutcome::default();
        for mut conflict in conflicts {
            let chosen = match choices.get(&conflict.id) {
                Some(Resolution::Local) => Some((Resolution::Local, conflict.local_value.clone())),
                Some(Resolution::Remote) => {
                    Some((Resolution::Remote, conflict.remote_value.clone()))
                }
                Some(Resolution::Merge) => Some(
                    merge(&conflict)
                        .map_or_else(|| latest(&conflict), |value| (Resolution::Merge, value)),
                ),
                Some(Resolution::Manual) | None => None,
            };
            match chosen {
                Some((resolution, value)) => {
                    conflict.resolve(resolution, value);
                    outcome.resolved.push(conflict);
                }
                None if conflict.resolved => outcome.resolved.push(conflict),
                None => {
                    conflict.defer();
                    outcome.remaining.push(conflict);
                }
            }
        }
        outcome
    }

    /// Write resolved values into a copy of `entity`
    pub fn apply(entity: &Entity, resolved: &[Conflict]) -> Result<Entity> {
        let mut merged = entity.clone();
        for conflict in resolved {
            if let Some(value) = &conflict.resolved_value {
                merged.set_field_value(conflict.field, value)?;
            }
        }
        Ok(merged)
    }
}

/// Remote wins ties: the remote copy is what every other device sees.
fn latest(conflict: &Conflict) -> (Resolution, Value) {
    if conflict.local_updated_at > conflict.remote_updated_at {
        (Resolution::Local, conflict.local_value.clone())
    } else {
        (Resolution::Remote, conflict.remote_value.clone())
    }
}

fn merge(conflict: &Conflict) -> Option<Value> {
    match (&conflict.local_value, &conflict.remote_value) {
        (Value::Bool(local), Value::Bool(remote)) => Some(Value::Bool(*local || *remote)),
        (Value::String(local), Value::String(remote)) => {
            let local_len = local.chars().count();
            let remote_len = remote.chars().count();
            if local_len == remote_len {
                None
            } else if local_len > remote_len {
                Some(conflict.local_value.clone())
            } else {
                Some(conflict.remote_value.clone())
            }
        }
        _ => None,
    }
}
