//! Core types for Simple Pedometer
//!
//! Time ranges, the sub-intervals they are split into, the samples produced by
//! querying each sub-interval, and the final active-duration report.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PedometerError;

/// Convert a signed duration to fractional seconds
pub fn duration_secs(delta: Duration) -> f64 {
    match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1_000_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

/// Convert epoch milliseconds (possibly fractional) to an absolute instant.
///
/// Hosts hand timestamps over as doubles, so sub-millisecond precision is kept.
pub fn instant_from_millis(millis: f64) -> Result<DateTime<Utc>, PedometerError> {
    if !millis.is_finite() {
        return Err(PedometerError::InvalidArgument(format!(
            "timestamp {millis} is not a finite number"
        )));
    }

    let whole = millis.floor();
    let frac_nanos = ((millis - whole) * 1_000_000.0).round() as i64;

    DateTime::<Utc>::from_timestamp_millis(whole as i64)
        .and_then(|t| t.checked_add_signed(Duration::nanoseconds(frac_nanos)))
        .ok_or_else(|| {
            PedometerError::InvalidArgument(format!("timestamp {millis} ms is out of range"))
        })
}

/// Absolute time range queried by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range, rejecting `end < start`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, PedometerError> {
        if end < start {
            return Err(PedometerError::InvalidRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// Create a range from epoch milliseconds
    pub fn from_millis(start_ms: f64, end_ms: f64) -> Result<Self, PedometerError> {
        Self::new(instant_from_millis(start_ms)?, instant_from_millis(end_ms)?)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Range length in seconds
    pub fn duration_secs(&self) -> f64 {
        duration_secs(self.duration())
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// One fixed-width slice of a [`TimeRange`], clipped at the range end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubInterval {
    /// Position within the partition, starting at 0
    pub index: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SubInterval {
    pub fn duration_secs(&self) -> f64 {
        duration_secs(self.end - self.start)
    }
}

/// Resolved step-count query for one sub-interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSample {
    pub interval: SubInterval,
    /// Step count reported by the source
    pub steps: u64,
    /// Difference to the previously applied sample
    pub delta: i64,
    /// Whether the interval counted towards the active duration
    pub active: bool,
}

/// Result of an active-duration computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveDuration {
    /// Sum of the durations of active sub-intervals (seconds)
    pub total_seconds: f64,
    /// Number of sub-intervals queried
    pub sub_intervals: usize,
    /// Number of sub-intervals with a positive delta
    pub active_intervals: usize,
    /// Number of sub-intervals whose query failed and was skipped
    pub failed_intervals: usize,
    /// Samples in the order they were applied
    pub samples: Vec<StepSample>,
}

impl ActiveDuration {
    /// Report for a range with nothing to query
    pub fn empty() -> Self {
        Self {
            total_seconds: 0.0,
            sub_intervals: 0,
            active_intervals: 0,
            failed_intervals: 0,
            samples: Vec::new(),
        }
    }
}
