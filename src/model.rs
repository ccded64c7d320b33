/// Core time-series types for the correlation engine.
///
/// This module defines the shared series model imported by the correlator,
/// the series stores, and the correlated-entry validator. It contains no I/O.

use chrono::{Duration, NaiveDateTime};

/// Format used when a timestamp is written back out as a field value.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// A single sample from a time series.
///
/// Timestamps are naive: CoSMo and CNV dumps both record local station time
/// without an offset, and the tables store them as `TIMESTAMP`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

impl Reading {
    pub fn new(timestamp: NaiveDateTime, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// One reference reading paired with one secondary reading found inside the
/// correlation margin.
///
/// A reference reading with N secondary matches produces N of these; matches
/// are never averaged or deduplicated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelatedEntry {
    /// Conductivity reading driving the correlation.
    pub reference: Reading,
    /// Rainfall reading within the margin of `reference.timestamp`.
    pub secondary: Reading,
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

/// One step of the correlation walk.
///
/// Reference rows are fetched from the half-open block `[start, end)`;
/// secondary rows from the block widened by `margin` on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub margin: Duration,
}

impl CorrelationWindow {
    pub fn query_start(&self) -> NaiveDateTime {
        self.start - self.margin
    }

    pub fn query_end(&self) -> NaiveDateTime {
        self.end + self.margin
    }

    /// Half-open block predicate. Keeps reference rows from being counted in
    /// two adjacent blocks.
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts >= self.start && ts < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 10, day)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
    }

    #[test]
    fn test_window_query_bounds_extend_by_margin() {
        let window = CorrelationWindow {
            start: at(1, 0, 0),
            end: at(8, 0, 0),
            margin: Duration::minutes(5),
        };
        assert_eq!(window.query_start(), at(1, 0, 0) - Duration::minutes(5));
        assert_eq!(window.query_end(), at(8, 0, 5));
    }

    #[test]
    fn test_block_is_half_open() {
        let window = CorrelationWindow {
            start: at(1, 0, 0),
            end: at(8, 0, 0),
            margin: Duration::minutes(5),
        };
        assert!(window.contains(at(1, 0, 0)));
        assert!(window.contains(at(7, 23, 59)));
        assert!(!window.contains(at(8, 0, 0)));
    }
}
