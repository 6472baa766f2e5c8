//! Wall-clock helpers
//!
//! The core is stateless between calls: every operation receives the current
//! UTC instant from the caller, which keeps the whole crate deterministic
//! under test. This module holds the few conversions the domain needs,
//! shift-window matching and floor-minute downtime.

use chrono::{DateTime, NaiveTime, Timelike, Utc};

/// Downtime between a stop and its resume, in whole minutes (floored).
///
/// A resume earlier than the stop (clock skew on the caller side) clamps
/// to zero rather than going negative.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use manufacturing_core_rs::core::time::downtime_minutes;
///
/// let stopped = Utc.with_ymd_and_hms(2025, 10, 12, 9, 0, 0).unwrap();
/// let resumed = Utc.with_ymd_and_hms(2025, 10, 12, 9, 15, 59).unwrap();
/// assert_eq!(downtime_minutes(stopped, resumed), 15);
/// ```
pub fn downtime_minutes(stopped_at: DateTime<Utc>, resumed_at: DateTime<Utc>) -> i64 {
    let seconds = (resumed_at - stopped_at).num_seconds();
    if seconds <= 0 {
        0
    } else {
        seconds / 60
    }
}

/// Whether a time-of-day falls inside the half-open window `[start, end)`.
///
/// Windows that cross midnight (start > end, e.g. a night shift from 22:00
/// to 06:00) wrap around.
pub fn in_shift_window(time: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        start <= time && time < end
    } else {
        time >= start || time < end
    }
}

/// Time-of-day of a UTC instant, truncated to whole seconds.
pub fn time_of_day(instant: DateTime<Utc>) -> NaiveTime {
    instant.time().with_nanosecond(0).unwrap_or_else(|| instant.time())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_downtime_floors() {
        let stopped = Utc.with_ymd_and_hms(2025, 10, 12, 9, 0, 0).unwrap();
        let resumed = Utc.with_ymd_and_hms(2025, 10, 12, 9, 7, 30).unwrap();
        assert_eq!(downtime_minutes(stopped, resumed), 7);
    }

    #[test]
    fn test_downtime_clamps_negative() {
        let stopped = Utc.with_ymd_and_hms(2025, 10, 12, 9, 0, 0).unwrap();
        let resumed = Utc.with_ymd_and_hms(2025, 10, 12, 8, 0, 0).unwrap();
        assert_eq!(downtime_minutes(stopped, resumed), 0);
    }

    #[test]
    fn test_shift_window_half_open() {
        assert!(in_shift_window(t(9, 0), t(9, 0), t(17, 0)));
        assert!(in_shift_window(t(16, 59), t(9, 0), t(17, 0)));
        assert!(!in_shift_window(t(17, 0), t(9, 0), t(17, 0)));
    }

    #[test]
    fn test_shift_window_wraps_midnight() {
        assert!(in_shift_window(t(23, 0), t(22, 0), t(6, 0)));
        assert!(in_shift_window(t(5, 59), t(22, 0), t(6, 0)));
        assert!(!in_shift_window(t(12, 0), t(22, 0), t(6, 0)));
    }
}
