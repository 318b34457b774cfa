//! Per-request column requirements against a physical source.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Logical to physical column name mapping for one physical table.
///
/// Names without an entry are assumed to be identical on both sides.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct PhysicalNameMapping(BTreeMap<String, String>);

impl PhysicalNameMapping {
    /// Build a mapping from `(logical, physical)` pairs.
    pub fn new<I, L, P>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (L, P)>,
        L: Into<String>,
        P: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(l, p)| (l.into(), p.into()))
                .collect(),
        )
    }

    /// Physical name for `logical`.
    pub fn physical_name<'a>(&'a self, logical: &'a str) -> &'a str {
        self.0.get(logical).map(String::as_str).unwrap_or(logical)
    }
}

/// The physical columns a request needs from one physical source.
///
/// Dimensions and metrics are tracked separately so that a request can later
/// be narrowed to the metrics one source actually serves
/// ([`with_metric_intersection`](Self::with_metric_intersection)); availability
/// only ever looks at the union of both.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PhysicalDataSourceConstraint {
    dimensions: BTreeSet<String>,
    metrics: BTreeSet<String>,
}

impl PhysicalDataSourceConstraint {
    /// Constraint over explicit physical dimension and metric names.
    pub fn new<D, M, S, T>(dimensions: D, metrics: M) -> Self
    where
        D: IntoIterator<Item = S>,
        M: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            dimensions: dimensions.into_iter().map(Into::into).collect(),
            metrics: metrics.into_iter().map(Into::into).collect(),
        }
    }

    /// Constraint over plain physical column names, with no metric split.
    pub fn from_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(columns, std::iter::empty::<String>())
    }

    /// Translate logical dimension and metric names through `mapping`.
    pub fn from_logical<'a, D, M>(dimensions: D, metrics: M, mapping: &PhysicalNameMapping) -> Self
    where
        D: IntoIterator<Item = &'a str>,
        M: IntoIterator<Item = &'a str>,
    {
        Self {
            dimensions: dimensions
                .into_iter()
                .map(|name| mapping.physical_name(name).to_string())
                .collect(),
            metrics: metrics
                .into_iter()
                .map(|name| mapping.physical_name(name).to_string())
                .collect(),
        }
    }

    /// Every required physical column name.
    pub fn all_column_physical_names(&self) -> BTreeSet<&str> {
        self.dimensions
            .iter()
            .chain(self.metrics.iter())
            .map(String::as_str)
            .collect()
    }

    /// Required physical dimension names.
    pub fn dimensions(&self) -> &BTreeSet<String> {
        &self.dimensions
    }

    /// Required physical metric names.
    pub fn metrics(&self) -> &BTreeSet<String> {
        &self.metrics
    }

    /// True if nothing is required.
    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty() && self.metrics.is_empty()
    }

    /// Copy of this constraint keeping only metrics present in `metrics`.
    ///
    /// Dimensions are untouched.
    pub fn with_metric_intersection(&self, metrics: &BTreeSet<String>) -> Self {
        Self {
            dimensions: self.dimensions.clone(),
            metrics: self.metrics.intersection(metrics).cloned().collect(),
        }
    }
}
