//! Data model for document correspondences

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Which side of the bridge a change came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// The event-sourced document store (push-capable)
    Left,
    /// The poll-only note store
    Right,
}

impl Origin {
    pub fn opposite(self) -> Self {
        match self {
            Origin::Left => Origin::Right,
            Origin::Right => Origin::Left,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Left => "left",
            Origin::Right => "right",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Origin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Origin::Left),
            "right" => Ok(Origin::Right),
            other => Err(format!("unknown origin: {}", other)),
        }
    }
}

/// Opaque per-document modification marker.
///
/// Both remotes hand out RFC 3339 timestamps today, so markers that parse as
/// timestamps are ordered chronologically (which tolerates differing
/// precision and offsets). Anything else falls back to lexical order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionMarker(String);

impl VersionMarker {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.0)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// True when `self` is strictly newer than `other`.
    pub fn is_newer_than(&self, other: &VersionMarker) -> bool {
        self.compare(other) == Ordering::Greater
    }

    fn compare(&self, other: &VersionMarker) -> Ordering {
        match (self.as_timestamp(), other.as_timestamp()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self.0.cmp(&other.0),
        }
    }
}

impl fmt::Display for VersionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionMarker {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for VersionMarker {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Durable correspondence between one left document and one right note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMapping {
    pub left_id: String,
    pub right_id: String,
    pub last_synced_left_version: VersionMarker,
    pub last_synced_right_version: VersionMarker,
    pub last_write_origin: Origin,
    /// Our own clock, never either remote's
    pub last_write_timestamp: DateTime<Utc>,
}

impl SyncMapping {
    /// Identifier of this mapping on the given side
    pub fn id_on(&self, side: Origin) -> &str {
        match side {
            Origin::Left => &self.left_id,
            Origin::Right => &self.right_id,
        }
    }

    /// Version marker recorded for the given side at the last successful sync
    pub fn synced_version(&self, side: Origin) -> &VersionMarker {
        match side {
            Origin::Left => &self.last_synced_left_version,
            Origin::Right => &self.last_synced_right_version,
        }
    }
}
