//! Sync conflict model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::TrackedField;
use crate::error::Error;

/// Identifier of a single field conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(Uuid);

impl ConflictId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConflictId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Outcome chosen for a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Local,
    Remote,
    Merge,
    Manual,
}

impl Resolution {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Merge => "merge",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "mine" => Ok(Self::Local),
            "remote" | "theirs" => Ok(Self::Remote),
            "merge" => Ok(Self::Merge),
            "manual" => Ok(Self::Manual),
            other => Err(Error::InvalidInput(format!("unknown resolution: {other}"))),
        }
    }
}

/// Divergence of one field between the local and remote copy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: ConflictId,
    pub field: TrackedField,
    pub local_value: Value,
    pub remote_value: Value,
    /// Local entity's `updated_at` when the conflict was detected (Unix ms)
    pub local_updated_at: i64,
    /// Remote revision marker when the conflict was detected (Unix ms)
    pub remote_updated_at: i64,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub resolution: Option<Resolution>,
    /// Value to write back once resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_value: Option<Value>,
}

impl Conflict {
    pub fn new(
        field: TrackedField,
        local_value: Value,
        remote_value: Value,
        local_updated_at: i64,
        remote_updated_at: i64,
    ) -> Self {
        Self {
            id: ConflictId::new(),
            field,
            local_value,
            remote_value,
            local_updated_at,
            remote_updated_at,
            resolved: false,
            resolution: None,
            resolved_value: None,
        }
    }

    /// Mark resolved with the value that should be applied
    pub fn resolve(&mut self, resolution: Resolution, value: Value) {
        self.resolved = true;
        self.resolution = Some(resolution);
        self.resolved_value = Some(value);
    }

    /// Mark as waiting for a user decision
    pub fn defer(&mut self) {
        self.resolved = false;
        self.resolution = Some(Resolution::Manual);
        self.resolved_value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolution_parses_user_choices() {
        assert_eq!("mine".parse::<Resolution>().unwrap(), Resolution::Local);
        assert_eq!("Remote".parse::<Resolution>().unwrap(), Resolution::Remote);
        assert!("both".parse::<Resolution>().is_err());
    }

    #[test]
    fn conflict_serializes_lowercase_resolution() {
        let mut conflict = Conflict::new(TrackedField::Title, json!("a"), json!("b"), 1, 2);
        conflict.resolve(Resolution::Remote, json!("b"));

        let value = serde_json::to_value(&conflict).unwrap();
        assert_eq!(value["resolution"], json!("remote"));
        assert_eq!(value["field"], json!("title"));
        assert_eq!(value["resolved"], json!(true));
    }

    #[test]
    fn defer_clears_resolved_value() {
        let mut conflict = Conflict::new(TrackedField::Content, json!("a"), json!("b"), 1, 2);
        conflict.resolve(Resolution::Local, json!("a"));
        conflict.defer();
        assert!(!conflict.resolved);
        assert_eq!(conflict.resolution, Some(Resolution::Manual));
        assert_eq!(conflict.resolved_value, None);
    }
}
