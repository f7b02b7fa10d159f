use chrono::{DateTime, Utc};
use erddap::{Fetched, Result, Transport};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;

pub const BASE: &str = "http://erddap.test/erddap";

/// Mock ERDDAP server answering from JSON fixtures.
///
/// `orderByMin` probes are answered from a feed that is contiguous from
/// `feed_start` onward.
pub struct MockErddap {
    fixtures: HashMap<String, &'static str>,
    feed_start: Option<DateTime<Utc>>,
    pub requests: RefCell<Vec<String>>,
}

impl MockErddap {
    pub fn new() -> Self {
        let mut fixtures = HashMap::new();
        fixtures.insert(
            format!("{BASE}/tabledap/allDatasets.json?datasetID,title,tabledap,metadata&cdm_data_type=%22TimeSeries%22"),
            include_str!("test_data/all_datasets_timeseries.json"),
        );
        fixtures.insert(
            format!("{BASE}/tabledap/allDatasets.json?datasetID,title,tabledap,metadata&cdm_data_type=%22Point%22"),
            include_str!("test_data/all_datasets_point.json"),
        );
        fixtures.insert(
            format!("{BASE}/info/IWBNetwork/index.json"),
            include_str!("test_data/iwbnetwork_metadata.json"),
        );
        fixtures.insert(
            format!("{BASE}/info/IrishNationalTideGaugeNetwork/index.json"),
            include_str!("test_data/tide_gauge_metadata.json"),
        );
        Self {
            fixtures,
            feed_start: None,
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn with_feed_start(mut self, start: &str) -> Self {
        self.feed_start = Some(erddap::window::parse_timestamp(start).unwrap());
        self
    }

    pub fn probe_count(&self) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|url| url.contains("orderByMin"))
            .count()
    }

    pub fn requests_to(&self, fragment: &str) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|url| url.contains(fragment))
            .count()
    }

    fn probe(&self, url: &str) -> Option<String> {
        let feed_start = self.feed_start?;
        let bound = |marker: &str| {
            let from = url.find(marker)? + marker.len();
            let rest = &url[from..];
            let to = rest.find('&').unwrap_or(rest.len());
            erddap::window::parse_timestamp(&rest[..to]).ok()
        };
        let (start, end) = (bound("time>=")?, bound("time<")?);
        if feed_start >= end {
            return None;
        }
        let first = erddap::window::format_timestamp(&feed_start.max(start));
        Some(format!(
            r#"{{"table": {{"columnNames": ["time"], "rows": [["{first}"]]}}}}"#
        ))
    }
}

impl Transport for MockErddap {
    fn get(&self, url: &str) -> Result<Fetched> {
        self.requests.borrow_mut().push(url.to_string());
        if let Some(body) = self.fixtures.get(url) {
            return Ok(Fetched::Body(Box::new(Cursor::new(body.as_bytes()))));
        }
        if url.contains("orderByMin") {
            if let Some(body) = self.probe(url) {
                return Ok(Fetched::Body(Box::new(Cursor::new(body.into_bytes()))));
            }
        }
        Ok(Fetched::Status(404))
    }
}
