use crate::limits::*;
use crate::model::*;

use super::GuardError;

/// Reject intervals the store will never accept: reversed or degenerate
/// bounds, timestamps outside the supported window, absurd durations.
pub(crate) fn validate_interval(interval: &Interval) -> Result<(), GuardError> {
    if interval.start >= interval.end {
        return Err(GuardError::InvalidInterval {
            start: interval.start,
            end: interval.end,
        });
    }
    if interval.start < MIN_VALID_TIMESTAMP_MS || interval.end > MAX_VALID_TIMESTAMP_MS {
        return Err(GuardError::InvalidInterval {
            start: interval.start,
            end: interval.end,
        });
    }
    if interval.duration_ms() > MAX_INTERVAL_DURATION_MS {
        return Err(GuardError::LimitExceeded("interval too wide"));
    }
    Ok(())
}

/// A principal must be present and plausible at every entry point; resolving
/// one is the connection layer's job, never the guard's.
pub(crate) fn require_principal(principal: Option<&str>) -> Result<&str, GuardError> {
    match principal {
        Some(p) if !p.is_empty() && p.len() <= MAX_PRINCIPAL_LEN => Ok(p),
        Some(_) => Err(GuardError::LimitExceeded("principal id too long or empty")),
        None => Err(GuardError::Unauthorized),
    }
}

/// Find a committed reservation overlapping `interval`, if any. Caller holds
/// the parking lock, so the answer stays true until the lock is released.
pub(crate) fn find_conflict(ps: &ParkingState, interval: &Interval) -> Result<(), GuardError> {
    for reservation in ps.overlapping(interval) {
        if reservation.interval.overlaps(interval) {
            return Err(GuardError::Conflict(reservation.id));
        }
    }
    Ok(())
}

/// Merge sorted intervals into a disjoint cover. Adjacent intervals fuse.
pub fn merge_intervals(sorted: &[Interval]) -> Vec<Interval> {
    let mut merged: Vec<Interval> = Vec::new();
    for &interval in sorted {
        if let Some(last) = merged.last_mut()
            && interval.start <= last.end
        {
            last.end = last.end.max(interval.end);
            continue;
        }
        merged.push(interval);
    }
    merged
}

/// Subtract sorted, disjoint `booked` intervals from `window`, returning the
/// free gaps in order.
pub fn subtract_intervals(window: &Interval, booked: &[Interval]) -> Vec<Interval> {
    let mut free = Vec::new();
    let mut cursor = window.start;

    for b in booked {
        if b.end <= cursor {
            continue;
        }
        if b.start >= window.end {
            break;
        }
        if b.start > cursor {
            free.push(Interval::new(cursor, b.start));
        }
        cursor = cursor.max(b.end);
    }

    if cursor < window.end {
        free.push(Interval::new(cursor, window.end));
    }
    free
}
