//! Half-open time intervals and simplified interval sets.
//!
//! [`IntervalSet`] is the currency of availability: every column of every
//! physical source is described by one, and every availability answer is one.
//!
//! - Intervals are half-open `[start, end)` over UTC instants.
//! - An `IntervalSet` is always *simplified*: sorted ascending, with no two
//!   members overlapping or touching. Overlapping or adjacent inputs are
//!   coalesced at construction time.
//! - Sets are immutable values. Every operation returns a new set.
//! - "Nothing available" is the empty set; there is no absent value.
//!
//! ```
//! use timeseries_gateway_core::interval::{IntervalSet, TimeInterval};
//!
//! let a = IntervalSet::from("2024-01-01T00:00:00Z/2024-01-03T00:00:00Z".parse::<TimeInterval>()?);
//! let b = IntervalSet::from("2024-01-02T00:00:00Z/2024-01-05T00:00:00Z".parse::<TimeInterval>()?);
//!
//! let both = a.intersect(&b);
//! let expected: TimeInterval = "2024-01-02T00:00:00Z/2024-01-03T00:00:00Z".parse()?;
//! assert_eq!(both.intervals(), &[expected]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snafu::{ensure, prelude::*};

/// Errors raised while constructing or parsing intervals.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum IntervalError {
    /// Start and end must satisfy `start < end`.
    #[snafu(display("Invalid interval: start={start}, end={end} (expect start < end)"))]
    InvalidRange {
        /// Lower (inclusive) bound supplied by the caller.
        start: DateTime<Utc>,
        /// Upper (exclusive) bound supplied by the caller.
        end: DateTime<Utc>,
    },

    /// Interval text did not contain the `start/end` separator.
    #[snafu(display("Interval '{text}' is missing the '/' separator"))]
    MissingSeparator {
        /// The original interval text.
        text: String,
    },

    /// One side of the interval text is not an RFC 3339 instant.
    #[snafu(display("Invalid instant '{instant}' in interval '{text}': {source}"))]
    InvalidInstant {
        /// The original interval text.
        text: String,
        /// The side that failed to parse.
        instant: String,
        /// Underlying chrono parse error.
        source: chrono::ParseError,
    },
}

/// A half-open time range `[start, end)` with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeInterval {
    /// Construct an interval, rejecting empty or inverted ranges.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, IntervalError> {
        ensure!(start < end, InvalidRangeSnafu { start, end });
        Ok(Self { start, end })
    }

    /// Inclusive lower bound.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Length of the interval.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// True if `ts` falls inside `[start, end)`.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    /// True if the two intervals share at least one instant.
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The overlapping sub-range of two intervals, if any.
    pub fn intersection(&self, other: &TimeInterval) -> Option<TimeInterval> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(TimeInterval { start, end })
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.start.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.end.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        )
    }
}

fn parse_instant(text: &str, instant: &str) -> Result<DateTime<Utc>, IntervalError> {
    DateTime::parse_from_rfc3339(instant.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .context(InvalidInstantSnafu { text, instant })
}

impl FromStr for TimeInterval {
    type Err = IntervalError;

    /// Parse the backend's `"<start>/<end>"` notation (RFC 3339 on both sides).
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (start, end) = text
            .split_once('/')
            .context(MissingSeparatorSnafu { text })?;

        let start = parse_instant(text, start)?;
        let end = parse_instant(text, end)?;
        TimeInterval::new(start, end)
    }
}

impl Serialize for TimeInterval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeInterval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// A sorted, non-overlapping, non-adjacent collection of [`TimeInterval`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct IntervalSet {
    intervals: Vec<TimeInterval>,
}

impl IntervalSet {
    /// The empty set (nothing available).
    pub fn empty() -> Self {
        Self {
            intervals: Vec::new(),
        }
    }

    /// Build a simplified set from arbitrary intervals.
    ///
    /// Input order does not matter; overlapping and adjacent members are merged.
    pub fn from_intervals<I>(intervals: I) -> Self
    where
        I: IntoIterator<Item = TimeInterval>,
    {
        let mut sorted: Vec<TimeInterval> = intervals.into_iter().collect();
        sorted.sort_unstable();
        Self {
            intervals: coalesce_sorted(sorted),
        }
    }

    /// Borrow the members in ascending order.
    pub fn intervals(&self) -> &[TimeInterval] {
        &self.intervals
    }

    /// True if no instant is covered.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Number of disjoint member intervals.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Iterate the members in ascending order.
    pub fn iter(&self) -> std::slice::Iter<'_, TimeInterval> {
        self.intervals.iter()
    }

    /// True if some member contains `ts`.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        let idx = self.intervals.partition_point(|iv| iv.end <= ts);
        self.intervals.get(idx).is_some_and(|iv| iv.contains(ts))
    }

    /// Instants covered by both `self` and `other`.
    ///
    /// Sorted merge over both member lists, O(n + m). Associative and
    /// commutative, so any fold order over many sets yields the same result.
    pub fn intersect(&self, other: &IntervalSet) -> IntervalSet {
        let (a, b) = (&self.intervals, &other.intervals);
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);

        while i < a.len() && j < b.len() {
            if let Some(overlap) = a[i].intersection(&b[j]) {
                out.push(overlap);
            }
            // Advance whichever member finishes first; it cannot overlap anything later.
            if a[i].end < b[j].end {
                i += 1;
            } else {
                j += 1;
            }
        }

        IntervalSet { intervals: out }
    }

    /// Instants covered by `self` or `other`.
    pub fn union(&self, other: &IntervalSet) -> IntervalSet {
        let (a, b) = (&self.intervals, &other.intervals);
        let mut merged = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);

        while i < a.len() && j < b.len() {
            if a[i] <= b[j] {
                merged.push(a[i]);
                i += 1;
            } else {
                merged.push(b[j]);
                j += 1;
            }
        }
        merged.extend_from_slice(&a[i..]);
        merged.extend_from_slice(&b[j..]);

        IntervalSet {
            intervals: coalesce_sorted(merged),
        }
    }

    /// Instants covered by `self` but not by `other`.
    pub fn subtract(&self, other: &IntervalSet) -> IntervalSet {
        let removed = &other.intervals;
        let mut out = Vec::new();
        let mut j = 0;

        for iv in &self.intervals {
            let mut cursor = iv.start;

            while j < removed.len() && removed[j].end <= cursor {
                j += 1;
            }

            let mut k = j;
            while k < removed.len() && removed[k].start < iv.end {
                if removed[k].start > cursor {
                    out.push(TimeInterval {
                        start: cursor,
                        end: removed[k].start,
                    });
                }
                cursor = cursor.max(removed[k].end);
                if removed[k].end > iv.end {
                    // Still overlaps the next member; keep it.
                    break;
                }
                k += 1;
            }

            if cursor < iv.end {
                out.push(TimeInterval {
                    start: cursor,
                    end: iv.end,
                });
            }
            j = k;
        }

        IntervalSet { intervals: out }
    }

    /// Portions of `expected` that this set does not cover.
    ///
    /// This is `expected - self`.
    pub fn missing_within(&self, expected: &IntervalSet) -> IntervalSet {
        expected.subtract(self)
    }

    /// Sum of member durations.
    pub fn total_duration(&self) -> Duration {
        self.intervals
            .iter()
            .fold(Duration::zero(), |acc, iv| acc + iv.duration())
    }

    /// Covered fraction of `expected`, in `[0.0, 1.0]`.
    ///
    /// For an empty `expected` this returns `1.0` by convention
    /// (vacuous full coverage).
    pub fn coverage_ratio(&self, expected: &IntervalSet) -> f64 {
        let expected_secs = duration_secs(expected.total_duration());
        if expected_secs <= 0.0 {
            return 1.0;
        }
        duration_secs(self.intersect(expected).total_duration()) / expected_secs
    }
}

fn duration_secs(d: Duration) -> f64 {
    d.num_seconds() as f64 + f64::from(d.subsec_nanos()) * 1e-9
}

/// Merge overlapping or touching neighbours of an already sorted list.
fn coalesce_sorted(sorted: Vec<TimeInterval>) -> Vec<TimeInterval> {
    let mut out: Vec<TimeInterval> = Vec::with_capacity(sorted.len());

    for iv in sorted {
        match out.last_mut() {
            Some(last) if iv.start <= last.end => {
                if iv.end > last.end {
                    last.end = iv.end;
                }
            }
            _ => out.push(iv),
        }
    }

    out
}

impl FromIterator<TimeInterval> for IntervalSet {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = TimeInterval>,
    {
        Self::from_intervals(iter)
    }
}

impl From<TimeInterval> for IntervalSet {
    fn from(interval: TimeInterval) -> Self {
        Self {
            intervals: vec![interval],
        }
    }
}

impl<'a> IntoIterator for &'a IntervalSet {
    type Item = &'a TimeInterval;
    type IntoIter = std::slice::Iter<'a, TimeInterval>;

    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}

impl fmt::Display for IntervalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, iv) in self.intervals.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{iv}")?;
        }
        f.write_str("]")
    }
}

impl Serialize for IntervalSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.intervals)
    }
}

impl<'de> Deserialize<'de> for IntervalSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<TimeInterval>::deserialize(deserializer).map(IntervalSet::from_intervals)
    }
}
