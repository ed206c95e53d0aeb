//! Splitting a time range into fixed-width sub-intervals

use chrono::Duration;

use crate::error::PedometerError;
use crate::types::{SubInterval, TimeRange};

fn nanos(delta: Duration) -> i128 {
    delta
        .num_nanoseconds()
        .map_or_else(|| i128::from(delta.num_milliseconds()) * 1_000_000, i128::from)
}

/// Number of slices of `width` needed to cover `range`, last one clipped
pub fn sub_interval_count(range: &TimeRange, width: Duration) -> Result<u128, PedometerError> {
    let width = nanos(width);
    if width <= 0 {
        return Err(PedometerError::InvalidConfig(
            "sub-interval width must be positive".to_string(),
        ));
    }

    let span = nanos(range.duration()).max(0);
    Ok(((span + width - 1) / width) as u128)
}

/// Partition `[start, end)` into consecutive slices of `width`.
///
/// The last slice is clipped to `end`; a zero-length range yields no slices. Ranges
/// needing more than `max_sub_intervals` slices are rejected before anything is allocated.
pub fn partition(
    range: &TimeRange,
    width: Duration,
    max_sub_intervals: usize,
) -> Result<Vec<SubInterval>, PedometerError> {
    let needed = sub_interval_count(range, width)?;
    if needed > max_sub_intervals as u128 {
        return Err(PedometerError::TooManySubIntervals {
            needed,
            max: max_sub_intervals,
        });
    }

    let mut intervals = Vec::with_capacity(needed as usize);
    let mut cursor = range.start;

    while cursor < range.end {
        let end = cursor
            .checked_add_signed(width)
            .map_or(range.end, |next| next.min(range.end));

        intervals.push(SubInterval {
            index: intervals.len(),
            start: cursor,
            end,
        });
        cursor = end;
    }

    Ok(intervals)
}
