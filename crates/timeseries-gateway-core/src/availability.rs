//! Availability resolution for physical sources.
//!
//! An [`Availability`] answers "for which time intervals can this physical
//! source serve every column the request needs?". The answer is computed on
//! each call from whatever snapshot the metadata store hands back at that
//! instant; nothing is cached here.
//!
//! Multi-column requests use AND semantics: the result is the intersection of
//! every required column's intervals, so a gap in any one column is a gap in
//! the answer.

use std::{
    collections::BTreeSet,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use log::{debug, warn};

use crate::{
    constraint::PhysicalDataSourceConstraint,
    interval::IntervalSet,
    metadata::{AvailabilityMetadataStore, ColumnIntervals, DataSourceName},
};

/// Interval coverage services for one physical table.
pub trait Availability: Send + Sync + fmt::Debug {
    /// Names of the backing data sources, in declaration order.
    fn data_source_names(&self) -> Vec<DataSourceName>;

    /// Every column this source knows about with its available intervals.
    fn all_available_intervals(&self) -> ColumnIntervals;

    /// Intervals for which every column required by `constraint` is available.
    ///
    /// An empty result means the source cannot answer; it is not an error.
    fn available_intervals(&self, constraint: &PhysicalDataSourceConstraint) -> IntervalSet;
}

/// Availability backed directly by one data source in a metadata store.
///
/// Equality compares the source name and the *identity* of the store, never
/// its contents, and hashing uses the name only. Store contents change as
/// segments arrive; keys derived from this value stay stable across those
/// changes.
#[derive(Clone)]
pub struct ConcreteAvailability {
    name: DataSourceName,
    store: Arc<dyn AvailabilityMetadataStore>,
}

impl ConcreteAvailability {
    /// Bind `name` to `store`.
    pub fn new(name: DataSourceName, store: Arc<dyn AvailabilityMetadataStore>) -> Self {
        Self { name, store }
    }

    /// The bound data source.
    pub fn data_source_name(&self) -> &DataSourceName {
        &self.name
    }

    /// The metadata store this availability reads from.
    pub fn metadata_store(&self) -> &Arc<dyn AvailabilityMetadataStore> {
        &self.store
    }
}

impl Availability for ConcreteAvailability {
    fn data_source_names(&self) -> Vec<DataSourceName> {
        vec![self.name.clone()]
    }

    fn all_available_intervals(&self) -> ColumnIntervals {
        self.store
            .get(&self.name)
            .map(|snapshot| (*snapshot).clone())
            .unwrap_or_default()
    }

    fn available_intervals(&self, constraint: &PhysicalDataSourceConstraint) -> IntervalSet {
        let columns: BTreeSet<&str> = constraint.all_column_physical_names();
        if columns.is_empty() {
            // Nothing required is never "available".
            return IntervalSet::empty();
        }

        let Some(snapshot) = self.store.get(&self.name) else {
            warn!(
                "No availability metadata for data source {}; treating as unavailable",
                self.name
            );
            return IntervalSet::empty();
        };

        let mut per_column = columns.iter().map(|column| {
            snapshot.get(*column).cloned().unwrap_or_else(|| {
                debug!("Column {column} has no availability in {}", self.name);
                IntervalSet::empty()
            })
        });

        let Some(first) = per_column.next() else {
            return IntervalSet::empty();
        };
        let available = per_column.fold(first, |acc, next| acc.intersect(&next));

        debug!(
            "Resolved {} column(s) of {} to {available}",
            columns.len(),
            self.name
        );
        available
    }
}

impl PartialEq for ConcreteAvailability {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.store, &other.store)
    }
}

impl Eq for ConcreteAvailability {}

impl Hash for ConcreteAvailability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for ConcreteAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcreteAvailability")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ConcreteAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConcreteAvailability for data source: {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashSet};

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{interval::TimeInterval, metadata::InMemoryMetadataStore};

    fn iv(start: i64, end: i64) -> TimeInterval {
        let ts = |s| Utc.timestamp_opt(s, 0).single().expect("valid timestamp");
        TimeInterval::new(ts(start), ts(end)).expect("valid interval")
    }

    fn store_with(columns: &[(&str, &[(i64, i64)])]) -> Arc<InMemoryMetadataStore> {
        let store = InMemoryMetadataStore::new();
        let map: ColumnIntervals = columns
            .iter()
            .map(|(name, ranges)| {
                let set = ranges.iter().map(|&(s, e)| iv(s, e)).collect();
                (name.to_string(), set)
            })
            .collect();
        store.replace("wiki".into(), map);
        Arc::new(store)
    }

    fn availability(store: &Arc<InMemoryMetadataStore>) -> ConcreteAvailability {
        ConcreteAvailability::new("wiki".into(), store.clone())
    }

    #[test]
    fn empty_constraint_resolves_to_empty_set() {
        let store = store_with(&[("colA", &[(0, 10)])]);
        let resolved = availability(&store).available_intervals(&Default::default());
        assert!(resolved.is_empty());
    }

    #[test]
    fn two_columns_intersect() {
        let store = store_with(&[("colA", &[(0, 10)]), ("colB", &[(5, 15)])]);
        let constraint = PhysicalDataSourceConstraint::from_columns(["colA", "colB"]);

        let resolved = availability(&store).available_intervals(&constraint);
        assert_eq!(resolved.intervals(), &[iv(5, 10)]);
    }

    #[test]
    fn single_column_returns_its_intervals() {
        let store = store_with(&[("colA", &[(0, 10), (20, 30)])]);
        let constraint = PhysicalDataSourceConstraint::from_columns(["colA"]);

        let resolved = availability(&store).available_intervals(&constraint);
        assert_eq!(resolved.intervals(), &[iv(0, 10), iv(20, 30)]);
    }

    #[test]
    fn absent_column_collapses_result() {
        let store = store_with(&[("colA", &[(0, 10)])]);
        let constraint = PhysicalDataSourceConstraint::from_columns(["colA", "missing"]);

        assert!(availability(&store).available_intervals(&constraint).is_empty());
    }

    #[test]
    fn unknown_source_resolves_to_empty_set() {
        let store: Arc<dyn AvailabilityMetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let avail = ConcreteAvailability::new("nowhere".into(), store);
        let constraint = PhysicalDataSourceConstraint::from_columns(["colA"]);

        assert!(avail.available_intervals(&constraint).is_empty());
        assert!(avail.all_available_intervals().is_empty());
    }

    #[test]
    fn equality_uses_store_identity_not_contents() {
        let store = store_with(&[("colA", &[(0, 10)])]);
        let twin = store_with(&[("colA", &[(0, 10)])]);

        let a = availability(&store);
        let b = availability(&store);
        let c = availability(&twin);

        assert_eq!(a, b);
        assert_ne!(a, c);

        // Mutating store contents does not change equality or hash buckets.
        store.replace("wiki".into(), BTreeMap::new());
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));
        assert!(!set.contains(&c));
    }

    #[test]
    fn display_names_the_source() {
        let store = store_with(&[]);
        assert_eq!(
            availability(&store).to_string(),
            "ConcreteAvailability for data source: wiki"
        );
    }
}
