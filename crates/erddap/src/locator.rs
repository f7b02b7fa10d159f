//! Binary search for the earliest observation of a feed.
//!
//! The date range from a configured lower bound to tomorrow is cut into a
//! grid of fixed-size windows. Each probe asks the server for the earliest
//! row inside one window; a hit narrows the search to earlier windows, a
//! miss to later ones. The search assumes the feed is contiguous from its
//! first observation onward.

use crate::client::{Transport, fetch_table};
use crate::error::Result;
use crate::window::{date_grid, midnight, midnight_utc, parse_timestamp};
use chrono::{DateTime, Days, NaiveDate, Utc};
use diagnostics::*;

/// "Earliest row with time in `[start, end)`", or `None` when empty.
pub trait Probe {
    fn earliest_between(&mut self, start: NaiveDate, end: NaiveDate)
    -> Result<Option<DateTime<Utc>>>;
}

/// Probe backed by tabledap's `orderByMin` directive.
pub struct TabledapProbe<'a, T: Transport + ?Sized> {
    transport: &'a T,
    tabledap: &'a str,
    time_column: &'a str,
}

impl<'a, T: Transport + ?Sized> TabledapProbe<'a, T> {
    pub fn new(transport: &'a T, tabledap: &'a str, time_column: &'a str) -> Self {
        Self {
            transport,
            tabledap,
            time_column,
        }
    }

    pub fn url(&self, start: NaiveDate, end: NaiveDate) -> String {
        let tc = self.time_column;
        format!(
            "{}.json?{tc}&{tc}>={}&{tc}<{}&orderByMin(%22{tc}%22)",
            self.tabledap,
            midnight(start),
            midnight(end)
        )
    }
}

impl<T: Transport + ?Sized> Probe for TabledapProbe<'_, T> {
    fn earliest_between(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<DateTime<Utc>>> {
        let url = self.url(start, end);
        let Some(table) = fetch_table(self.transport, &url)? else {
            return Ok(None);
        };
        table
            .first_value(self.time_column)
            .map(|value| parse_timestamp(&value))
            .transpose()
    }
}

/// Result of a search: the timestamp found and how many probes it took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    pub earliest: DateTime<Utc>,
    pub probes: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct TimeRangeLocator {
    pub earliest: NaiveDate,
    pub stride_days: u32,
}

impl Default for TimeRangeLocator {
    fn default() -> Self {
        Self {
            earliest: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap_or(NaiveDate::MIN),
            stride_days: 60,
        }
    }
}

impl TimeRangeLocator {
    pub fn new(earliest: NaiveDate, stride_days: u32) -> Self {
        Self {
            earliest,
            stride_days,
        }
    }

    /// Search `[earliest, today + 1 day)`. Never fails to produce a value:
    /// with no hit at all the result is the first grid point at midnight.
    pub fn locate<P: Probe + ?Sized>(&self, probe: &mut P, today: NaiveDate) -> Result<Located> {
        let end = today.checked_add_days(Days::new(1)).unwrap_or(today);
        let grid = date_grid(self.earliest, end, self.stride_days);

        // Window i is [grid[i], grid[i + 1]); search window indices [lo, hi).
        let mut lo = 0;
        let mut hi = grid.len().saturating_sub(1);
        let mut best = None;
        let mut probes = 0;

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            probes += 1;
            match probe.earliest_between(grid[mid], grid[mid + 1])? {
                Some(found) => {
                    best = Some(found);
                    hi = mid;
                }
                None => lo = mid + 1,
            }
        }

        let earliest = best.unwrap_or_else(|| midnight_utc(grid[0]));
        let found = crate::window::format_timestamp(&earliest);
        let windows = grid.len().saturating_sub(1);
        info!("Located earliest time {found} after {probes} probes over {windows} windows");
        Ok(Located { earliest, probes })
    }
}
