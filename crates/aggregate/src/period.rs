use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Time-bucket granularity. Each period is also a string column of the
/// local table holding the bucket of the row's `time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    /// In column order.
    pub const ALL: [Period; 5] = [
        Period::Minutely,
        Period::Hourly,
        Period::Daily,
        Period::Weekly,
        Period::Monthly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Period::Minutely => "minutely",
            Period::Hourly => "hourly",
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
        }
    }

    /// Capitalized form used in titles.
    pub fn title(self) -> &'static str {
        match self {
            Period::Minutely => "Minutely",
            Period::Hourly => "Hourly",
            Period::Daily => "Daily",
            Period::Weekly => "Weekly",
            Period::Monthly => "Monthly",
        }
    }

    pub fn is_bucket_column(name: &str) -> bool {
        Self::ALL.iter().any(|p| p.as_str() == name)
    }

    /// Bucket label of `ts`. Weeks are ISO weeks labelled by ISO year.
    pub fn bucket(self, ts: &DateTime<Utc>) -> String {
        match self {
            Period::Minutely => ts.format("%Y-%m-%dT%H%M").to_string(),
            Period::Hourly => ts.format("%Y-%m-%dT%H").to_string(),
            Period::Daily => ts.format("%Y-%m-%d").to_string(),
            Period::Weekly => {
                let week = ts.iso_week();
                format!("{:04}-{:02}", week.year(), week.week())
            }
            Period::Monthly => ts.format("%Y-%m").to_string(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| Error::InvalidPeriod(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        erddap::window::parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_bucket_formats() {
        let t = ts("2016-01-05T07:08:09Z");
        assert_eq!(Period::Minutely.bucket(&t), "2016-01-05T0708");
        assert_eq!(Period::Hourly.bucket(&t), "2016-01-05T07");
        assert_eq!(Period::Daily.bucket(&t), "2016-01-05");
        assert_eq!(Period::Weekly.bucket(&t), "2016-01");
        assert_eq!(Period::Monthly.bucket(&t), "2016-01");
    }

    #[test]
    fn test_iso_week_crosses_year() {
        // 2016-01-01 is a Friday in ISO week 53 of 2015
        assert_eq!(Period::Weekly.bucket(&ts("2016-01-01T12:00:00Z")), "2015-53");
        assert_eq!(Period::Weekly.bucket(&ts("2018-12-31T00:00:00Z")), "2019-01");
    }

    #[test]
    fn test_parse_period() {
        assert_eq!("daily".parse::<Period>().unwrap(), Period::Daily);
        assert_eq!("Weekly".parse::<Period>().unwrap(), Period::Weekly);
        assert!(matches!("yearly".parse::<Period>(), Err(Error::InvalidPeriod(_))));
        assert!(Period::is_bucket_column("hourly"));
        assert!(!Period::is_bucket_column("time"));
    }
}
