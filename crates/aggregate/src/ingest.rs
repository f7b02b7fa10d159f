use crate::decode::{RowDecoder, csv_batches};
use crate::error::{Error, Result};
use crate::period::Period;
use crate::schema::Schema;
use crate::store::{BatchSink, Row};
use diagnostics::*;
use erddap::{Fetched, TimeWindow, Transport, quote_plus};
use serde::{Deserialize, Serialize};

/// Sizes governing ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Days per remote request.
    pub stride_days: u32,
    /// Rows per sink write; also the decoder's batch size.
    pub batch_size: usize,
    /// Rows per transaction.
    pub commit_interval: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            stride_days: 60,
            batch_size: 1000,
            commit_interval: 500_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub rows: usize,
    /// Rows dropped because their time could not be read.
    pub skipped_rows: usize,
    pub flushes: usize,
    pub commits: usize,
    pub windows: usize,
    pub failed_windows: usize,
}

/// Streams a time range of a remote dataset into a [`BatchSink`].
pub struct StreamingIngestor<'a, T: Transport + ?Sized> {
    transport: &'a T,
    tabledap: &'a str,
    options: IngestOptions,
    index_period: Option<Period>,
}

/// Batch and transaction bookkeeping for one ingestion.
struct Pending<'s, S: BatchSink + ?Sized> {
    sink: &'s mut S,
    options: IngestOptions,
    batch: Vec<Row>,
    uncommitted: usize,
    stats: IngestStats,
}

impl<S: BatchSink + ?Sized> Pending<'_, S> {
    fn push(&mut self, row: Row) -> Result<()> {
        self.batch.push(row);
        if self.batch.len() >= self.options.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let size = self.batch.len();
        self.sink.write_batch(&self.batch)?;
        self.batch.clear();
        self.stats.rows += size;
        self.stats.flushes += 1;
        self.uncommitted += size;

        let total = self.stats.rows;
        debug!("Flushed {size} rows ({total} total)");

        if self.uncommitted >= self.options.commit_interval {
            self.sink.commit()?;
            self.sink.begin()?;
            self.stats.commits += 1;
            self.uncommitted = 0;
            info!("Committed {total} rows");
        }
        Ok(())
    }
}

impl<'a, T: Transport + ?Sized> StreamingIngestor<'a, T> {
    pub fn new(transport: &'a T, tabledap: &'a str) -> Self {
        Self {
            transport,
            tabledap,
            options: IngestOptions::default(),
            index_period: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    /// Index the table on the primary keys plus this period's bucket once
    /// loaded.
    #[must_use]
    pub fn indexed_by(mut self, period: Period) -> Self {
        self.index_period = Some(period);
        self
    }

    /// `{tabledap}.csv?{fields}&{time}>={start}&{time}<{end}&{constraints}`.
    pub fn window_url(&self, schema: &Schema, window: &TimeWindow, constraints: &[String]) -> Result<String> {
        let fields: Vec<&str> = schema.remote_columns().map(|c| c.remote_name.as_str()).collect();
        let time = &schema.time_column()?.remote_name;
        let mut url = format!(
            "{}.csv?{}&{time}>={}&{time}<{}",
            self.tabledap,
            fields.join(","),
            window.start_timestamp(),
            window.end_timestamp()
        );
        for constraint in constraints {
            url.push('&');
            url.push_str(&quote_plus(constraint));
        }
        Ok(url)
    }

    /// Load `range` window by window. Failed windows are logged and
    /// skipped; sink errors end the ingestion.
    pub fn ingest<S: BatchSink + ?Sized>(
        &self,
        schema: &Schema,
        range: TimeWindow,
        constraints: &[String],
        sink: &mut S,
    ) -> Result<IngestStats> {
        let decoder = RowDecoder::new(schema)?;
        sink.begin()?;
        let mut pending = Pending {
            sink,
            options: self.options,
            batch: Vec::with_capacity(self.options.batch_size),
            uncommitted: 0,
            stats: IngestStats::default(),
        };

        for window in range.split(self.options.stride_days) {
            pending.stats.windows += 1;
            let url = self.window_url(schema, &window, constraints)?;
            let span = window.to_string();
            info!("Fetching window {span}");

            let body = match self.transport.get(&url) {
                Ok(Fetched::Body(body)) => body,
                Ok(Fetched::Status(status)) => {
                    warn!("Window {span} failed with HTTP {status}, skipping");
                    pending.stats.failed_windows += 1;
                    continue;
                }
                Err(e) => {
                    let error = e.to_string();
                    warn!("Window {span} failed: {error}, skipping");
                    pending.stats.failed_windows += 1;
                    continue;
                }
            };

            let before = pending.stats.rows + pending.batch.len();
            match self.load_window(&decoder, schema, body, &mut pending) {
                Ok(()) => {}
                Err(e @ (Error::Arrow(_) | Error::Io(_))) => {
                    let error = e.to_string();
                    warn!("Window {span} stopped early: {error}");
                    pending.stats.failed_windows += 1;
                }
                Err(e) => return Err(e),
            }
            let loaded = pending.stats.rows + pending.batch.len() - before;
            debug!("Window {span} yielded {loaded} rows");
        }

        pending.flush()?;
        if let Some(period) = self.index_period {
            let mut columns: Vec<&str> = schema
                .primary_keys()
                .iter()
                .map(|c| c.normalized_name.as_str())
                .collect();
            columns.push(period.as_str());
            pending.sink.create_index(&columns)?;
        }
        pending.sink.commit()?;
        pending.stats.commits += 1;

        let stats = pending.stats;
        let (rows, skipped, windows, failed) =
            (stats.rows, stats.skipped_rows, stats.windows, stats.failed_windows);
        info!("Ingested {rows} rows from {windows} windows ({failed} failed, {skipped} rows skipped)");
        Ok(stats)
    }

    fn load_window<S: BatchSink + ?Sized>(
        &self,
        decoder: &RowDecoder,
        schema: &Schema,
        body: Box<dyn std::io::Read + Send>,
        pending: &mut Pending<'_, S>,
    ) -> Result<()> {
        for batch in csv_batches(schema, body, self.options.batch_size)? {
            let decoded = decoder.decode(&batch?)?;
            pending.stats.skipped_rows += decoded.skipped;
            for row in decoded.rows {
                pending.push(row)?;
            }
        }
        Ok(())
    }
}
