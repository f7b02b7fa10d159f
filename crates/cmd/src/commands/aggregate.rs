use aggregate::{Aggregation, JoinStrategy, Period, resolve_start};
use anyhow::{Context, Result};
use arrow::util::pretty::pretty_format_batches;
use diagnostics::*;
use erddap::window::{next_month, parse_start_date};
use erddap::{Server, Transport};
use std::io::Write;

use crate::config::Config;

/// Arguments of one `aggregate` invocation, as typed by the user.
#[derive(Debug, Clone, Default)]
pub struct AggregateRequest {
    pub series: String,
    pub period: String,
    pub constraints: Vec<String>,
    /// `YYYY-MM` or `YYYY-MM-DD`; the dataset's earliest month when absent.
    pub start: Option<String>,
    pub months: u32,
    /// Overrides the configured join strategy.
    pub join: Option<String>,
    /// Print the batches instead of writing them.
    pub preview: bool,
}

pub fn aggregate_command<T: Transport>(
    server: &Server<T>,
    config: &Config,
    request: &AggregateRequest,
    out: &mut impl Write,
) -> Result<()> {
    // Bad input is rejected before anything is downloaded
    let period: Period = request.period.parse()?;
    let join = request
        .join
        .as_deref()
        .map(str::parse::<JoinStrategy>)
        .transpose()?;
    if let Some(start) = &request.start {
        parse_start_date(start)?;
    }
    if request.months == 0 {
        anyhow::bail!("--months must be at least 1");
    }

    let dataset = server.dataset(&request.series)?;
    let mut month = resolve_start(&dataset, request.start.as_deref())?;
    let aggregation = Aggregation::new(&dataset, config.run_settings(join));

    for _ in 0..request.months {
        let aggregate = aggregation
            .run(month, period, &request.constraints)
            .with_context(|| format!("Failed to aggregate {} for {month}", request.series))?;
        let rows = aggregate.batch.num_rows();
        let stats = aggregate.stats;

        if request.preview {
            writeln!(out, "{} {}", aggregate.dataset_id, aggregate.month)?;
            writeln!(out, "{}", pretty_format_batches(&[aggregate.batch.clone()])?)?;
        } else {
            let (file, part) = aggregate.write(&config.data_dir, &config.dataset_dir)?;
            let file = file.display().to_string();
            info!("Wrote {rows} aggregated rows to {file}");
            writeln!(out, "{file}")?;
            writeln!(out, "{}", part.display())?;
        }
        if stats.failed_windows > 0 {
            let failed = stats.failed_windows;
            warn!("{failed} windows failed while loading {month}");
        }
        writeln!(
            out,
            "{} rows loaded, {} skipped, {rows} aggregated",
            stats.rows, stats.skipped_rows
        )?;

        month = next_month(month)?;
    }
    Ok(())
}
