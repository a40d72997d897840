use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleet_domain::StateSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Target,
    Current,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Target => "target",
            SnapshotKind::Current => "current",
        }
    }
}

/// One retained prior version of a snapshot, kept purely for observability
/// (§6 "a history table for observability"). Only `SaveCurrent` appends to
/// history; the target pointer is replaced without a trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub kind: SnapshotKind,
    pub body: StateSnapshot,
    pub created_at: DateTime<Utc>,
}

/// Oldest history rows beyond this count are dropped on each append.
pub const HISTORY_RETENTION: usize = 20;
