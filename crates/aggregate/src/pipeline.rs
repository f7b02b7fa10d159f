use crate::error::Result;
use crate::ingest::{IngestOptions, IngestStats, StreamingIngestor};
use crate::output::{
    OutputAttributes, dataset_id, file_dir, output_path, render_descriptor, to_record_batch,
    write_descriptor, write_parquet,
};
use crate::period::Period;
use crate::query::{AggregateQuery, JoinStrategy};
use crate::schema::Schema;
use crate::store::LocalStore;
use arrow::array::RecordBatch;
use chrono::NaiveDate;
use diagnostics::*;
use erddap::window::{month_start, parse_start_date};
use erddap::{Dataset, TimeWindow, Transport};
use std::path::{Path, PathBuf};

/// Knobs for one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Where the ephemeral store lives.
    pub work_dir: PathBuf,
    pub ingest: IngestOptions,
    pub join: JoinStrategy,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir(),
            ingest: IngestOptions::default(),
            join: JoinStrategy::default(),
        }
    }
}

/// The aggregated statistics of one month of a dataset.
#[derive(Debug, Clone)]
pub struct MonthlyAggregate {
    /// Output dataset id, `{table}_{period}`.
    pub dataset_id: String,
    pub month: TimeWindow,
    pub period: Period,
    pub query: AggregateQuery,
    pub stats: IngestStats,
    pub batch: RecordBatch,
}

impl MonthlyAggregate {
    /// Write the Parquet file and the descriptor fragment. Returns both paths.
    pub fn write(&self, data_dir: &Path, dataset_dir: &Path) -> Result<(PathBuf, PathBuf)> {
        let path = output_path(data_dir, &self.dataset_id, self.month.start);
        write_parquet(&path, &self.batch)?;
        let descriptor = render_descriptor(&self.dataset_id, &file_dir(data_dir, &self.dataset_id), &self.batch)?;
        let part = write_descriptor(dataset_dir, &self.dataset_id, &descriptor)?;
        Ok((path, part))
    }
}

/// Runs month-long aggregations of one remote dataset.
pub struct Aggregation<'d, 'a, T: Transport> {
    dataset: &'d Dataset<'a, T>,
    settings: RunSettings,
}

impl<'d, 'a, T: Transport> Aggregation<'d, 'a, T> {
    pub fn new(dataset: &'d Dataset<'a, T>, settings: RunSettings) -> Self {
        Self { dataset, settings }
    }

    pub fn schema(&self) -> Result<Schema> {
        Schema::build(&self.dataset.table_name(), self.dataset.columns()?)
    }

    /// Ingest `[month_start, month_start + 1 month)` into a fresh store and
    /// aggregate it by `period`. The store is gone when this returns.
    pub fn run(&self, month_start: NaiveDate, period: Period, constraints: &[String]) -> Result<MonthlyAggregate> {
        let schema = self.schema()?;
        let query = AggregateQuery::build(&schema, period, self.settings.join)?;
        let month = TimeWindow::month_from(month_start)?;
        let id = self.dataset.id();
        let span = month.to_string();
        let granularity = period.as_str();
        info!("Aggregating {id} {granularity} over {span}");

        let (result, stats) = {
            let mut store = LocalStore::create(&self.settings.work_dir, &schema)?;
            let stats = StreamingIngestor::new(self.dataset.transport(), self.dataset.tabledap())
                .with_options(self.settings.ingest)
                .indexed_by(period)
                .ingest(&schema, month, constraints, &mut store)?;
            (store.query(&query.to_sql())?, stats)
        };
        let buckets = result.rows.len();
        debug!("Aggregate query returned {buckets} rows");

        let catalog = self.dataset.catalog()?;
        let attributes =
            OutputAttributes::propagate(&query, &schema, &catalog.attributes(), &catalog.summary());
        let batch = to_record_batch(&query, &result, &attributes)?;

        Ok(MonthlyAggregate {
            dataset_id: dataset_id(schema.table_name(), period),
            month,
            period,
            query,
            stats,
            batch,
        })
    }
}

/// First month to aggregate: an explicit `YYYY-MM[-DD]` wins, otherwise the
/// month holding the dataset's earliest observation.
pub fn resolve_start<T: Transport>(dataset: &Dataset<'_, T>, explicit: Option<&str>) -> Result<NaiveDate> {
    if let Some(value) = explicit {
        return Ok(parse_start_date(value)?);
    }
    let earliest = dataset.earliest_time()?;
    Ok(month_start(earliest.date_naive()))
}
