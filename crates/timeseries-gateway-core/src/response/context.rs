//! Per-request state shared by every processing stage.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use snafu::prelude::*;

use crate::interval::{IntervalError, IntervalSet, TimeInterval};

/// Completeness metadata reported by the backend for one query.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UncoveredIntervals {
    /// The raw `uncoveredIntervals` value as reported.
    pub uncovered_intervals: Value,
    /// True if the backend truncated the list.
    pub uncovered_intervals_overflowed: bool,
}

/// Errors interpreting reported uncovered intervals.
#[derive(Debug, Snafu)]
pub enum UncoveredIntervalsError {
    /// `uncoveredIntervals` is not a JSON array.
    #[snafu(display("uncoveredIntervals is not an array"))]
    NotAnArray,

    /// An entry is not a string.
    #[snafu(display("uncoveredIntervals[{index}] is not a string"))]
    NotAString {
        /// Position of the offending entry.
        index: usize,
    },

    /// An entry is not a valid interval.
    #[snafu(display("uncoveredIntervals[{index}] is not a valid interval: {source}"))]
    InvalidInterval {
        /// Position of the offending entry.
        index: usize,
        /// Underlying parse error.
        source: IntervalError,
    },
}

impl UncoveredIntervals {
    /// Interpret the reported list as an [`IntervalSet`].
    pub fn parse_intervals(&self) -> Result<IntervalSet, UncoveredIntervalsError> {
        let entries = self
            .uncovered_intervals
            .as_array()
            .context(NotAnArraySnafu)?;

        let mut intervals = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let text = entry.as_str().context(NotAStringSnafu { index })?;
            let interval = text
                .parse::<TimeInterval>()
                .context(InvalidIntervalSnafu { index })?;
            intervals.push(interval);
        }
        Ok(IntervalSet::from_intervals(intervals))
    }
}

/// Mutable bag of request state, owned by the terminal stage.
///
/// Stages record derived signals here instead of editing the document.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ResponseContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    uncovered: Option<UncoveredIntervals>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    diagnostics: BTreeMap<String, Value>,
}

impl ResponseContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the backend's completeness report.
    pub fn set_uncovered_intervals(&mut self, uncovered: UncoveredIntervals) {
        self.uncovered = Some(uncovered);
    }

    /// The recorded completeness report, if any stage stored one.
    pub fn uncovered_intervals(&self) -> Option<&UncoveredIntervals> {
        self.uncovered.as_ref()
    }

    /// Store a free-form diagnostic value, replacing any previous one.
    pub fn insert_diagnostic(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.diagnostics.insert(key.into(), value)
    }

    /// Look up a diagnostic.
    pub fn diagnostic(&self, key: &str) -> Option<&Value> {
        self.diagnostics.get(key)
    }

    /// Every diagnostic, keyed by name.
    pub fn diagnostics(&self) -> &BTreeMap<String, Value> {
        &self.diagnostics
    }
}
