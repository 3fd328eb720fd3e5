//! Cached values, entries and the cache-event stream payload.

use prints_core::{BlueprintRecord, BlueprintSummary, EpochMillis, KeySet, PaginatedSummaries};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::key::QueryKey;

/// Typed payload of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "data", rename_all = "camelCase")]
pub enum CacheValue {
    Record(BlueprintRecord),
    Summary(BlueprintSummary),
    RecentSummaries(PaginatedSummaries),
    KeySet(KeySet),
    Flag(bool),
    Tags(Vec<String>),
}

impl CacheValue {
    /// Shape name, comparable with [`QueryKey::expected_shape`].
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Record(_) => "record",
            Self::Summary(_) => "summary",
            Self::RecentSummaries(_) => "recentSummaries",
            Self::KeySet(_) => "keySet",
            Self::Flag(_) => "flag",
            Self::Tags(_) => "tags",
        }
    }

    pub fn fits(&self, key: &QueryKey) -> bool {
        self.shape() == key.expected_shape()
    }
}

/// One cached query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub value: CacheValue,
    /// When the value was last written, in milliseconds.
    pub updated_at: EpochMillis,
    /// Set by an explicit invalidation; cleared by the next write.
    pub invalidated: bool,
}

impl CacheEntry {
    pub fn new(value: CacheValue, updated_at: EpochMillis) -> Self {
        Self {
            value,
            updated_at,
            invalidated: false,
        }
    }

    /// Stale when invalidated or older than `stale_time` at `now`.
    pub fn is_stale_at(&self, now: EpochMillis, stale_time: Duration) -> bool {
        if self.invalidated {
            return true;
        }
        let age = now.saturating_sub(self.updated_at);
        age >= 0 && age as u128 >= stale_time.as_millis()
    }
}

/// What happened to a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheEventKind {
    Updated,
    Invalidated,
    Removed,
}

/// Notification broadcast on every cache change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    pub kind: CacheEventKind,
    pub key: QueryKey,
    /// The new value for `Updated` events.
    pub value: Option<CacheValue>,
}

impl CacheEvent {
    pub fn updated(key: QueryKey, value: CacheValue) -> Self {
        Self {
            kind: CacheEventKind::Updated,
            key,
            value: Some(value),
        }
    }

    pub fn invalidated(key: QueryKey) -> Self {
        Self {
            kind: CacheEventKind::Invalidated,
            key,
            value: None,
        }
    }

    pub fn removed(key: QueryKey) -> Self {
        Self {
            kind: CacheEventKind::Removed,
            key,
            value: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_staleness() {
        let stale_time = Duration::from_secs(60);
        let mut entry = CacheEntry::new(CacheValue::Flag(true), 1_000);
        assert!(!entry.is_stale_at(1_000, stale_time));
        assert!(!entry.is_stale_at(60_999, stale_time));
        assert!(entry.is_stale_at(61_000, stale_time));

        entry.invalidated = true;
        assert!(entry.is_stale_at(1_000, stale_time));
    }

    #[test]
    fn test_value_fits_key() {
        assert!(CacheValue::KeySet(KeySet::new()).fits(&QueryKey::tag_index("combat")));
        assert!(!CacheValue::Flag(true).fits(&QueryKey::KnownTags));
    }
}
