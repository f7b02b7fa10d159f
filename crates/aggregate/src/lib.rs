//! Local side of the aggregation pipeline: schema derivation, streaming
//! ingestion into an ephemeral SQLite store, the per-period statistics
//! query and its Parquet output.

pub mod decode;
pub mod error;
pub mod ingest;
pub mod output;
pub mod period;
pub mod pipeline;
pub mod query;
pub mod schema;
pub mod stat;
pub mod store;

pub use error::{Error, Result};
pub use ingest::{IngestOptions, IngestStats, StreamingIngestor};
pub use output::OutputAttributes;
pub use period::Period;
pub use pipeline::{Aggregation, MonthlyAggregate, RunSettings, resolve_start};
pub use query::{AggregateQuery, JoinStrategy, OutputColumn, OutputKind, Statistic};
pub use schema::{Schema, SchemaColumn};
pub use stat::{Reducer, StatAccumulator, register_reducer};
pub use store::{BatchSink, LocalStore, ResultSet, Row};
