//! Per-source column availability metadata.
//!
//! The gateway never owns segment metadata; an external refresh process keeps a
//! store up to date while many requests read it concurrently. This module
//! defines the read interface the core depends on ([`AvailabilityMetadataStore`])
//! and an in-memory implementation that refreshers can write into.
//!
//! Snapshot semantics:
//! - Each source maps to one immutable [`ColumnIntervals`] behind an `Arc`.
//! - Writers replace the whole per-source map at once, so a reader observes
//!   either the previous map or the new one, never a mix.
//! - Readers may see stale data; they never see a torn value.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};

use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::interval::{IntervalSet, TimeInterval};

/// Identifier for a physical data source in the backing store.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct DataSourceName(pub String);

impl DataSourceName {
    /// Construct a name from anything string-like.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataSourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for DataSourceName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Column name to available intervals for one physical source.
pub type ColumnIntervals = BTreeMap<String, IntervalSet>;

/// Read-only view of availability metadata.
///
/// Implementations must return a consistent value per key: a reader may see
/// an outdated map, but never a partially written one.
pub trait AvailabilityMetadataStore: Send + Sync + fmt::Debug {
    /// Snapshot of the column intervals for `source`.
    ///
    /// `None` means the store knows nothing about the source, which callers
    /// treat as "no coverage for any column".
    fn get(&self, source: &DataSourceName) -> Option<Arc<ColumnIntervals>>;
}

/// A single segment as reported by the backing store: one time interval and
/// the columns it carries.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Time range covered by the segment.
    pub interval: TimeInterval,
    /// Dimension and metric columns physically present in the segment.
    pub columns: Vec<String>,
}

/// Errors from loading metadata snapshots.
#[derive(Debug, Snafu)]
pub enum MetadataError {
    /// The snapshot file could not be read.
    #[snafu(display("Failed to read metadata snapshot at {path}: {source}"))]
    ReadSnapshot {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The snapshot text is not valid JSON of the expected shape.
    #[snafu(display("Invalid metadata snapshot: {source}"))]
    ParseSnapshot {
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// Process-wide in-memory metadata store.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    sources: RwLock<HashMap<DataSourceName, Arc<ColumnIntervals>>>,
}

impl InMemoryMetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a snapshot of the form
    /// `{ "<source>": { "<column>": ["<start>/<end>", ...] } }`.
    pub fn from_snapshot_json(text: &str) -> Result<Self, MetadataError> {
        let parsed: HashMap<DataSourceName, ColumnIntervals> =
            serde_json::from_str(text).context(ParseSnapshotSnafu)?;

        let sources = parsed
            .into_iter()
            .map(|(name, columns)| (name, Arc::new(columns)))
            .collect();

        Ok(Self {
            sources: RwLock::new(sources),
        })
    }

    /// Read and parse a snapshot file (see [`Self::from_snapshot_json`]).
    pub fn load_snapshot(path: &Path) -> Result<Self, MetadataError> {
        let text = std::fs::read_to_string(path).context(ReadSnapshotSnafu {
            path: path.display().to_string(),
        })?;
        Self::from_snapshot_json(&text)
    }

    /// Atomically replace the column map for `source`.
    pub fn replace(&self, source: DataSourceName, columns: ColumnIntervals) {
        let mut guard = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(source, Arc::new(columns));
    }

    /// Rebuild the column map for `source` from its current segments.
    ///
    /// Each column's availability is the union of the intervals of every
    /// segment that carries it.
    pub fn apply_segments<'a, I>(&self, source: DataSourceName, segments: I)
    where
        I: IntoIterator<Item = &'a SegmentInfo>,
    {
        let mut columns: ColumnIntervals = BTreeMap::new();

        for segment in segments {
            let seg_set = IntervalSet::from(segment.interval);
            for column in &segment.columns {
                let merged = columns
                    .get(column)
                    .map(|existing| existing.union(&seg_set))
                    .unwrap_or_else(|| seg_set.clone());
                columns.insert(column.clone(), merged);
            }
        }

        debug!(
            "Refreshed availability for {source}: {} column(s)",
            columns.len()
        );
        self.replace(source, columns);
    }

    /// Forget everything known about `source`.
    pub fn remove(&self, source: &DataSourceName) -> Option<Arc<ColumnIntervals>> {
        let mut guard = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        guard.remove(source)
    }

    /// Names of every source currently tracked, sorted.
    pub fn source_names(&self) -> Vec<DataSourceName> {
        let guard = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = guard.keys().cloned().collect();
        names.sort();
        names
    }
}

impl AvailabilityMetadataStore for InMemoryMetadataStore {
    fn get(&self, source: &DataSourceName) -> Option<Arc<ColumnIntervals>> {
        let guard = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(source).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn iv(start: i64, end: i64) -> TimeInterval {
        let ts = |s| Utc.timestamp_opt(s, 0).single().expect("valid timestamp");
        TimeInterval::new(ts(start), ts(end)).expect("valid interval")
    }

    #[test]
    fn missing_source_is_none() {
        let store = InMemoryMetadataStore::new();
        assert!(store.get(&"absent".into()).is_none());
    }

    #[test]
    fn replace_swaps_whole_snapshot() {
        let store = InMemoryMetadataStore::new();
        let name = DataSourceName::new("wiki");

        store.replace(
            name.clone(),
            BTreeMap::from([("added".to_string(), IntervalSet::from(iv(0, 10)))]),
        );
        let before = store.get(&name).expect("present");

        store.replace(
            name.clone(),
            BTreeMap::from([("deleted".to_string(), IntervalSet::from(iv(5, 15)))]),
        );
        let after = store.get(&name).expect("present");

        // Readers holding the old snapshot keep seeing it unchanged.
        assert!(before.contains_key("added"));
        assert!(!before.contains_key("deleted"));
        assert!(after.contains_key("deleted"));
        assert!(!after.contains_key("added"));
    }

    #[test]
    fn apply_segments_unions_per_column() {
        let store = InMemoryMetadataStore::new();
        let name = DataSourceName::new("wiki");
        let segments = vec![
            SegmentInfo {
                interval: iv(0, 10),
                columns: vec!["page".into(), "added".into()],
            },
            SegmentInfo {
                interval: iv(10, 20),
                columns: vec!["page".into()],
            },
            SegmentInfo {
                interval: iv(30, 40),
                columns: vec!["added".into()],
            },
        ];

        store.apply_segments(name.clone(), &segments);
        let snapshot = store.get(&name).expect("present");

        assert_eq!(snapshot["page"].intervals(), &[iv(0, 20)]);
        assert_eq!(snapshot["added"].intervals(), &[iv(0, 10), iv(30, 40)]);
    }

    #[test]
    fn snapshot_json_round_trip_through_store() {
        let json = r#"{
            "wiki": {
                "added": ["1970-01-01T00:00:00Z/1970-01-01T00:00:10Z"],
                "page": []
            }
        }"#;
        let store = InMemoryMetadataStore::from_snapshot_json(json).expect("parse snapshot");
        let snapshot = store.get(&"wiki".into()).expect("present");

        assert_eq!(snapshot["added"].intervals(), &[iv(0, 10)]);
        assert!(snapshot["page"].is_empty());
        assert_eq!(store.source_names(), vec![DataSourceName::new("wiki")]);
    }

    #[test]
    fn invalid_snapshot_is_reported() {
        let err = InMemoryMetadataStore::from_snapshot_json(r#"{"wiki": {"a": ["nope"]}}"#)
            .unwrap_err();
        assert!(matches!(err, MetadataError::ParseSnapshot { .. }));
    }

    #[test]
    fn remove_forgets_source() {
        let store = InMemoryMetadataStore::new();
        let name = DataSourceName::new("wiki");
        store.replace(name.clone(), ColumnIntervals::new());
        assert!(store.remove(&name).is_some());
        assert!(store.get(&name).is_none());
    }
}
