//! Timestamp literals used in queries.
//!
//! A literal denotes a span at its own precision, so `20120826` covers the
//! whole day and `2012` the whole year. All literals are UTC.
//!
//! Accepted forms:
//! - compact: `YYYY`, `YYYYMM`, `YYYYMMDD`, `YYYYMMDDHH`, `YYYYMMDDHHMM`,
//!   `YYYYMMDDHHMMSS`
//! - dashed: `YYYY-MM`, `YYYY-MM-DD`
//! - RFC 3339: `2012-08-26T14:30:00Z` (an exact instant)

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Inclusive time span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSpan {
    pub fn instant(at: DateTime<Utc>) -> Self {
        Self { start: at, end: at }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

/// Parse a timestamp literal into the span it denotes.
pub fn parse_time_literal(s: &str) -> Option<TimeSpan> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(TimeSpan::instant(dt.with_timezone(&Utc)));
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        return parse_compact(s);
    }

    parse_dashed(s)
}

fn parse_compact(s: &str) -> Option<TimeSpan> {
    let precision = match s.len() {
        4 => Precision::Year,
        6 => Precision::Month,
        8 => Precision::Day,
        10 => Precision::Hour,
        12 => Precision::Minute,
        14 => Precision::Second,
        _ => return None,
    };

    let num = |range: std::ops::Range<usize>| -> Option<u32> {
        s.get(range).and_then(|p| p.parse().ok())
    };
    let year = s.get(0..4)?.parse::<i32>().ok()?;
    let month = if s.len() >= 6 { num(4..6)? } else { 1 };
    let day = if s.len() >= 8 { num(6..8)? } else { 1 };
    let hour = if s.len() >= 10 { num(8..10)? } else { 0 };
    let minute = if s.len() >= 12 { num(10..12)? } else { 0 };
    let second = if s.len() >= 14 { num(12..14)? } else { 0 };

    let start = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    span_from(start, precision)
}

fn parse_dashed(s: &str) -> Option<TimeSpan> {
    let parts: Vec<&str> = s.split('-').collect();
    let precision = match parts.len() {
        2 => Precision::Month,
        3 => Precision::Day,
        _ => return None,
    };
    if parts[0].len() != 4 || parts[1..].iter().any(|p| p.len() != 2) {
        return None;
    }

    let year = parts[0].parse::<i32>().ok()?;
    let month = parts[1].parse::<u32>().ok()?;
    let day = match parts.get(2) {
        Some(d) => d.parse::<u32>().ok()?,
        None => 1,
    };

    let start = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?;
    span_from(start, precision)
}

fn span_from(start: NaiveDateTime, precision: Precision) -> Option<TimeSpan> {
    let next = match precision {
        Precision::Year => NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)?.and_hms_opt(0, 0, 0)?,
        Precision::Month => {
            let (y, m) = if start.month() == 12 {
                (start.year() + 1, 1)
            } else {
                (start.year(), start.month() + 1)
            };
            NaiveDate::from_ymd_opt(y, m, 1)?.and_hms_opt(0, 0, 0)?
        }
        Precision::Day => start + Duration::days(1),
        Precision::Hour => start + Duration::hours(1),
        Precision::Minute => start + Duration::minutes(1),
        Precision::Second => start + Duration::seconds(1),
    };

    Some(TimeSpan {
        start: Utc.from_utc_datetime(&start),
        end: Utc.from_utc_datetime(&next) - Duration::microseconds(1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_day_literal() {
        let span = parse_time_literal("20120826").unwrap();
        assert_eq!(span.start, utc(2012, 8, 26, 0, 0, 0));
        assert_eq!(span.end, utc(2012, 8, 27, 0, 0, 0) - Duration::microseconds(1));
        assert_eq!(parse_time_literal("2012-08-26"), Some(span));
    }

    #[test]
    fn test_month_and_year_literals() {
        let dec = parse_time_literal("201212").unwrap();
        assert_eq!(dec.start, utc(2012, 12, 1, 0, 0, 0));
        assert_eq!(dec.end, utc(2013, 1, 1, 0, 0, 0) - Duration::microseconds(1));
        assert_eq!(parse_time_literal("2012-12"), Some(dec));

        let year = parse_time_literal("2012").unwrap();
        assert!(year.contains(utc(2012, 7, 4, 12, 0, 0)));
        assert!(!year.contains(utc(2013, 1, 1, 0, 0, 0)));
    }

    #[test]
    fn test_fine_grained_literals() {
        let minute = parse_time_literal("201208261430").unwrap();
        assert_eq!(minute.start, utc(2012, 8, 26, 14, 30, 0));
        assert!(minute.contains(utc(2012, 8, 26, 14, 30, 59)));
        assert!(!minute.contains(utc(2012, 8, 26, 14, 31, 0)));

        let second = parse_time_literal("20120826143005").unwrap();
        assert_eq!(second.start, utc(2012, 8, 26, 14, 30, 5));
    }

    #[test]
    fn test_rfc3339_is_instant() {
        let span = parse_time_literal("2012-08-26T14:30:00+02:00").unwrap();
        assert_eq!(span.start, utc(2012, 8, 26, 12, 30, 0));
        assert_eq!(span.start, span.end);
    }

    #[test]
    fn test_invalid_literals() {
        assert!(parse_time_literal("").is_none());
        assert!(parse_time_literal("hello").is_none());
        assert!(parse_time_literal("20121332").is_none());
        assert!(parse_time_literal("2012082").is_none());
        assert!(parse_time_literal("2012-8-26").is_none());
    }
}
