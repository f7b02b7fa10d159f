use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use std::fmt;

/// A half-open `[start, end)` range of calendar dates, bounding one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The calendar month starting at `start`.
    pub fn month_from(start: NaiveDate) -> Result<Self> {
        Ok(Self::new(start, next_month(start)?))
    }

    /// Split into consecutive sub-windows of at most `stride_days` days,
    /// using the same boundaries as [`date_grid`].
    pub fn split(&self, stride_days: u32) -> Vec<TimeWindow> {
        date_grid(self.start, self.end, stride_days)
            .windows(2)
            .map(|pair| TimeWindow::new(pair[0], pair[1]))
            .collect()
    }

    pub fn start_timestamp(&self) -> String {
        midnight(self.start)
    }

    pub fn end_timestamp(&self) -> String {
        midnight(self.end)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Boundary dates from `start` in steps of `stride_days`, strictly before
/// `end`, followed by `end` itself. `start >= end` yields just `[end]`.
pub fn date_grid(start: NaiveDate, end: NaiveDate, stride_days: u32) -> Vec<NaiveDate> {
    let stride = Days::new(u64::from(stride_days.max(1)));
    let mut dates = Vec::new();
    let mut current = start;
    while current < end {
        dates.push(current);
        match current.checked_add_days(stride) {
            Some(next) => current = next,
            None => break,
        }
    }
    dates.push(end);
    dates
}

/// ERDDAP's ISO-8601 form of a date at midnight UTC.
pub fn midnight(date: NaiveDate) -> String {
    format!("{}T00:00:00Z", date.format("%Y-%m-%d"))
}

pub fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

pub fn next_month(date: NaiveDate) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(1))
        .ok_or_else(|| Error::InvalidDate(date.to_string()))
}

/// The first day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day0(0).unwrap_or(date)
}

/// Parse a user-supplied start date, `YYYY-MM` (first of the month) or `YYYY-MM-DD`.
pub fn parse_start_date(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    let parsed = if value.len() == "2016-01".len() {
        NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d")
    } else {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
    };
    parsed.map_err(|_| Error::InvalidDate(value.to_string()))
}

/// Parse an ERDDAP timestamp (`2020-01-01T00:00:00Z`, fractional seconds allowed).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| Error::InvalidTimestamp(value.to_string()))
}

/// Canonical second-resolution form used in the local store.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
