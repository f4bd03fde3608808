//! Time window gate -- the hours during which notifications may go out.
//!
//! Bounds are wall-clock times in a fixed reference timezone. Every
//! timestamp is converted into that zone before it is compared.

use crate::error::RelayError;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;

/// Inclusive time-of-day range in a reference timezone.
///
/// There is no midnight wraparound: when `start > end` the range is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: NaiveTime,
    end: NaiveTime,
    timezone: Tz,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime, timezone: Tz) -> Self {
        Self {
            start,
            end,
            timezone,
        }
    }

    /// Build a window from config strings (`HH:MM:SS` or `HH:MM`, IANA zone name).
    pub fn parse(start: &str, end: &str, timezone: &str) -> Result<Self, RelayError> {
        let timezone: Tz = timezone
            .trim()
            .parse()
            .map_err(|e| RelayError::Config(format!("invalid timezone '{timezone}': {e}")))?;
        Ok(Self::new(parse_time(start)?, parse_time(end)?, timezone))
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// `start <= time <= end`, with `time` already in the reference zone.
    pub fn is_time_in_range(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }

    /// Convert `ts` to the reference zone and test its time of day.
    pub fn is_in_window<T: TimeZone>(&self, ts: &DateTime<T>) -> bool {
        self.is_time_in_range(ts.with_timezone(&self.timezone).time())
    }

    pub fn is_now_in_window(&self) -> bool {
        self.is_in_window(&Utc::now())
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} ({})",
            self.start.format("%H:%M:%S"),
            self.end.format("%H:%M:%S"),
            self.timezone.name()
        )
    }
}

/// Whether `ts` falls on the current calendar date, judged in `ts`'s own zone.
pub fn is_from_today<T: TimeZone>(ts: &DateTime<T>) -> bool {
    is_same_day(ts, &Utc::now())
}

/// Whether `ts` and `now` share a calendar date in `ts`'s zone.
pub fn is_same_day<T: TimeZone>(ts: &DateTime<T>, now: &DateTime<Utc>) -> bool {
    ts.date_naive() == now.with_timezone(&ts.timezone()).date_naive()
}

fn parse_time(value: &str) -> Result<NaiveTime, RelayError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|e| RelayError::Config(format!("invalid time '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn hms(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn utc_window() -> TimeWindow {
        TimeWindow::parse("10:00:00", "23:30:00", "UTC").unwrap()
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let w = utc_window();
        assert!(w.is_time_in_range(hms(10, 0, 0)));
        assert!(w.is_time_in_range(hms(23, 30, 0)));
        assert!(w.is_time_in_range(hms(15, 45, 12)));
        assert!(!w.is_time_in_range(hms(9, 59, 59)));
        assert!(!w.is_time_in_range(hms(23, 30, 1)));
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let w = TimeWindow::parse("22:00:00", "06:00:00", "UTC").unwrap();
        assert!(!w.is_time_in_range(hms(23, 0, 0)));
        assert!(!w.is_time_in_range(hms(3, 0, 0)));
        assert!(!w.is_time_in_range(hms(22, 0, 0)));
    }

    #[test]
    fn test_is_in_window_converts_timezone() {
        // 07:00 UTC is 10:00 in Istanbul (UTC+3, no DST).
        let w = TimeWindow::parse("10:00:00", "23:30:00", "Europe/Istanbul").unwrap();
        let inside = Utc.with_ymd_and_hms(2024, 6, 1, 7, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2024, 6, 1, 6, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 6, 1, 20, 30, 1).unwrap();
        assert!(w.is_in_window(&inside));
        assert!(!w.is_in_window(&before));
        assert!(!w.is_in_window(&after));
    }

    #[test]
    fn test_parse_accepts_short_and_unpadded_times() {
        let w = TimeWindow::parse("7:00", "20:30", "UTC").unwrap();
        assert_eq!(w.start(), hms(7, 0, 0));
        assert_eq!(w.end(), hms(20, 30, 0));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            TimeWindow::parse("25:00:00", "23:00:00", "UTC"),
            Err(RelayError::Config(_))
        ));
        assert!(matches!(
            TimeWindow::parse("10:00:00", "23:00:00", "Mars/Olympus"),
            Err(RelayError::Config(_))
        ));
    }

    #[test]
    fn test_same_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let morning = Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 1).unwrap();
        let yesterday = now - Duration::days(1);
        assert!(is_same_day(&morning, &now));
        assert!(!is_same_day(&yesterday, &now));
        assert!(is_from_today(&Utc::now()));
        assert!(!is_from_today(&(Utc::now() - Duration::days(1))));
    }

    #[test]
    fn test_display() {
        let w = TimeWindow::parse("7:00:00", "20:30:00", "Europe/Sofia").unwrap();
        assert_eq!(w.to_string(), "07:00:00 - 20:30:00 (Europe/Sofia)");
    }
}
