//! Physical tables and their per-request constrained views.

use std::{fmt, sync::Arc};

use crate::{
    availability::Availability,
    constraint::PhysicalDataSourceConstraint,
    interval::IntervalSet,
    metadata::{ColumnIntervals, DataSourceName},
};

/// A concrete, queryable table in the backing store.
#[derive(Clone)]
pub struct PhysicalTable {
    name: String,
    availability: Arc<dyn Availability>,
}

impl PhysicalTable {
    /// Create a table named `name` whose coverage is described by `availability`.
    pub fn new(name: impl Into<String>, availability: Arc<dyn Availability>) -> Self {
        Self {
            name: name.into(),
            availability,
        }
    }

    /// Table name as exposed by the gateway.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The availability backing this table.
    pub fn availability(&self) -> &Arc<dyn Availability> {
        &self.availability
    }

    /// Names of the backend data sources behind this table.
    pub fn data_source_names(&self) -> Vec<DataSourceName> {
        self.availability.data_source_names()
    }

    /// Every known column with its intervals.
    pub fn all_available_intervals(&self) -> ColumnIntervals {
        self.availability.all_available_intervals()
    }

    /// Bind this table to one request's column requirements.
    pub fn with_constraint(&self, constraint: PhysicalDataSourceConstraint) -> ConstrainedTable {
        ConstrainedTable {
            table: self.clone(),
            constraint,
        }
    }
}

impl fmt::Debug for PhysicalTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalTable")
            .field("name", &self.name)
            .field("availability", &self.availability)
            .finish()
    }
}

/// A physical table viewed through one request's constraint.
#[derive(Clone, Debug)]
pub struct ConstrainedTable {
    table: PhysicalTable,
    constraint: PhysicalDataSourceConstraint,
}

impl ConstrainedTable {
    /// Table name.
    pub fn name(&self) -> &str {
        self.table.name()
    }

    /// The unconstrained table.
    pub fn physical_table(&self) -> &PhysicalTable {
        &self.table
    }

    /// The constraint this view applies.
    pub fn constraint(&self) -> &PhysicalDataSourceConstraint {
        &self.constraint
    }

    /// Backend data source names, in source order. May repeat.
    pub fn data_source_names(&self) -> Vec<DataSourceName> {
        self.table.data_source_names()
    }

    /// Intervals for which this table can answer the constrained request.
    pub fn available_intervals(&self) -> IntervalSet {
        self.table.availability.available_intervals(&self.constraint)
    }
}
