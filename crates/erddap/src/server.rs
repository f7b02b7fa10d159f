use crate::client::{Transport, fetch_table};
use crate::error::{Error, Result};
use crate::locator::{TabledapProbe, TimeRangeLocator};
use crate::metadata::{Column, MetadataCatalog};
use crate::models::DatasetInfo;
use crate::window::{format_timestamp, parse_timestamp};
use chrono::{DateTime, NaiveDate, Utc};
use diagnostics::*;
use std::cell::OnceCell;
use std::collections::BTreeMap;

/// Feature types offered for aggregation.
const CDM_TYPES: [&str; 2] = ["TimeSeries", "Point"];

/// An ERDDAP server reachable through `T`.
pub struct Server<T: Transport> {
    base_url: String,
    transport: T,
    locator: TimeRangeLocator,
}

impl<T: Transport> Server<T> {
    pub fn new(base_url: impl Into<String>, transport: T) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport,
            locator: TimeRangeLocator::default(),
        }
    }

    #[must_use]
    pub fn with_locator(mut self, locator: TimeRangeLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn datasets_url(&self, cdm_data_type: &str) -> String {
        format!(
            "{}/tabledap/allDatasets.json?datasetID,title,tabledap,metadata&cdm_data_type=%22{cdm_data_type}%22",
            self.base_url
        )
    }

    /// Every TimeSeries and Point dataset advertised by the server.
    pub fn datasets(&self) -> Result<Vec<DatasetInfo>> {
        let mut datasets = Vec::new();
        for cdm_type in CDM_TYPES {
            let url = self.datasets_url(cdm_type);
            let Some(table) = fetch_table(&self.transport, &url)? else {
                debug!("No {cdm_type} datasets listed");
                continue;
            };
            datasets.extend(
                table
                    .into_records()
                    .iter()
                    .filter_map(DatasetInfo::from_record),
            );
        }
        let count = datasets.len();
        let server = self.base_url.as_str();
        debug!("Server {server} lists {count} datasets");
        Ok(datasets)
    }

    /// Handle on one dataset. Unknown ids fail with the list of known ones.
    pub fn dataset(&self, id: &str) -> Result<Dataset<'_, T>> {
        let datasets = self.datasets()?;
        let known: Vec<String> = datasets.iter().map(|d| d.dataset_id.clone()).collect();
        match datasets.into_iter().find(|d| d.dataset_id == id) {
            Some(info) => Ok(Dataset::new(self, info)),
            None => Err(Error::UnknownDataset {
                id: id.to_string(),
                known,
            }),
        }
    }
}

/// A remote dataset. Metadata, the column list and the earliest time are
/// fetched at most once per handle.
pub struct Dataset<'a, T: Transport> {
    server: &'a Server<T>,
    info: DatasetInfo,
    catalog: OnceCell<MetadataCatalog>,
    columns: OnceCell<Vec<Column>>,
    earliest: OnceCell<DateTime<Utc>>,
}

impl<'a, T: Transport> Dataset<'a, T> {
    pub fn new(server: &'a Server<T>, info: DatasetInfo) -> Self {
        Self {
            server,
            info,
            catalog: OnceCell::new(),
            columns: OnceCell::new(),
            earliest: OnceCell::new(),
        }
    }

    pub fn info(&self) -> &DatasetInfo {
        &self.info
    }

    pub fn id(&self) -> &str {
        &self.info.dataset_id
    }

    pub fn tabledap(&self) -> &str {
        &self.info.tabledap
    }

    pub fn transport(&self) -> &T {
        &self.server.transport
    }

    pub fn table_name(&self) -> String {
        crate::metadata::table_name_for(&self.info.dataset_id)
    }

    pub fn catalog(&self) -> Result<&MetadataCatalog> {
        if let Some(catalog) = self.catalog.get() {
            return Ok(catalog);
        }
        let catalog = MetadataCatalog::fetch(&self.server.transport, &self.info)?;
        Ok(self.catalog.get_or_init(|| catalog))
    }

    pub fn columns(&self) -> Result<&[Column]> {
        if let Some(columns) = self.columns.get() {
            return Ok(columns);
        }
        let columns = self.catalog()?.columns();
        Ok(self.columns.get_or_init(|| columns))
    }

    /// Remote name of the column that maps to `time`.
    pub fn time_column(&self) -> Result<&str> {
        self.columns()?
            .iter()
            .find(|c| c.normalized_name == "time")
            .map(|c| c.remote_name.as_str())
            .ok_or_else(|| Error::NoTimeColumn(self.id().to_string()))
    }

    /// Dataset-wide attributes.
    pub fn summary(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.catalog()?.summary())
    }

    /// Earliest observation: the declared `time_coverage_start` when present,
    /// otherwise a binary search against the server.
    pub fn earliest_time(&self) -> Result<DateTime<Utc>> {
        self.earliest_time_at(Utc::now().date_naive())
    }

    pub fn earliest_time_at(&self, today: NaiveDate) -> Result<DateTime<Utc>> {
        if let Some(earliest) = self.earliest.get() {
            return Ok(*earliest);
        }
        let earliest = self.find_earliest(today)?;
        Ok(*self.earliest.get_or_init(|| earliest))
    }

    fn find_earliest(&self, today: NaiveDate) -> Result<DateTime<Utc>> {
        let id = self.id();
        if let Some(declared) = self.summary()?.get("time_coverage_start") {
            match parse_timestamp(declared) {
                Ok(ts) => {
                    debug!("Using declared time_coverage_start {declared} for {id}");
                    return Ok(ts);
                }
                Err(_) => warn!("Ignoring unparseable time_coverage_start {declared} for {id}"),
            }
        }

        let time_column = self.time_column()?;
        info!("Searching for the earliest time of {id}");
        let mut probe = TabledapProbe::new(&self.server.transport, self.tabledap(), time_column);
        let located = self.server.locator.locate(&mut probe, today)?;
        let earliest = format_timestamp(&located.earliest);
        let probes = located.probes;
        info!("Earliest time of {id} is {earliest} ({probes} probes)");
        Ok(located.earliest)
    }
}
