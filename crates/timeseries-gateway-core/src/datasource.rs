//! Logical data sources sent to the backend.
//!
//! A [`DataSource`] is either a direct reference to one physical table or a
//! virtual source defined by a nested backend query. Both variants resolve to
//! exactly one physical table; the query variant additionally carries the
//! query whose result it reads.
//!
//! Serialized form (the `query` key is omitted for table sources):
//!
//! ```json
//! { "type": "query", "names": ["wiki_hourly"], "query": { "queryType": "groupBy" } }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::table::ConstrainedTable;

/// Discriminant for [`DataSource`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceType {
    /// Direct reference to a physical table.
    Table,
    /// Virtual source defined by a nested query.
    Query,
}

/// An opaque backend query definition.
///
/// Query construction happens elsewhere; the core only carries it along and
/// reads a few identifying fields for logging.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct BackendQuery(Value);

impl BackendQuery {
    /// Wrap an already-built JSON query.
    pub fn new(query: Value) -> Self {
        Self(query)
    }

    /// The `queryType` field, if present.
    pub fn query_type(&self) -> Option<&str> {
        self.0.get("queryType").and_then(Value::as_str)
    }

    /// Borrow the raw JSON.
    pub fn as_json(&self) -> &Value {
        &self.0
    }
}

/// Data source of a backend query.
#[derive(Clone, Debug)]
pub enum DataSource {
    /// Reads one physical table directly.
    Table {
        /// The table read.
        table: ConstrainedTable,
    },
    /// Reads the result of a nested backend query.
    Query {
        /// The physical table backing the nested query's result.
        table: ConstrainedTable,
        /// The nested query.
        query: Box<BackendQuery>,
    },
}

impl DataSource {
    /// Table source.
    pub fn from_table(table: ConstrainedTable) -> Self {
        DataSource::Table { table }
    }

    /// Query source over `table`.
    pub fn from_query(table: ConstrainedTable, query: BackendQuery) -> Self {
        DataSource::Query {
            table,
            query: Box::new(query),
        }
    }

    /// Which variant this is.
    pub fn data_source_type(&self) -> DataSourceType {
        match self {
            DataSource::Table { .. } => DataSourceType::Table,
            DataSource::Query { .. } => DataSourceType::Query,
        }
    }

    /// The single physical table behind this source.
    pub fn physical_table(&self) -> &ConstrainedTable {
        match self {
            DataSource::Table { table } | DataSource::Query { table, .. } => table,
        }
    }

    /// The physical table wrapped in a one-element collection.
    ///
    /// A data source only ever has one table; union semantics live at the
    /// physical table level. This shape exists for older callers.
    #[deprecated(note = "a data source has exactly one table; use `physical_table`")]
    pub fn physical_tables(&self) -> Vec<&ConstrainedTable> {
        vec![self.physical_table()]
    }

    /// Backend names of the physical table's data sources, deduplicated with
    /// first-occurrence order preserved.
    pub fn names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.physical_table()
            .data_source_names()
            .into_iter()
            .map(|name| name.0)
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }

    /// The nested query, for query sources.
    pub fn query(&self) -> Option<&BackendQuery> {
        match self {
            DataSource::Table { .. } => None,
            DataSource::Query { query, .. } => Some(query.as_ref()),
        }
    }
}

#[derive(Serialize)]
struct DataSourceRepr<'a> {
    #[serde(rename = "type")]
    kind: DataSourceType,
    names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<&'a BackendQuery>,
}

impl Serialize for DataSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        DataSourceRepr {
            kind: self.data_source_type(),
            names: self.names(),
            query: self.query(),
        }
        .serialize(serializer)
    }
}
