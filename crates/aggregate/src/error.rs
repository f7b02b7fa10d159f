use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Erddap(#[from] erddap::Error),

    #[error("Local store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table {0} has no time column")]
    NoTimeColumn(String),

    #[error("Table {0} has no numeric columns to aggregate")]
    NoNumericColumns(String),

    #[error("Unknown period '{0}', expected one of minutely, hourly, daily, weekly, monthly")]
    InvalidPeriod(String),

    #[error("Unknown join strategy '{0}', expected anchored or grouped")]
    InvalidJoin(String),

    #[error("Schema error: {0}")]
    Schema(String),
}

pub type Result<T> = std::result::Result<T, Error>;
