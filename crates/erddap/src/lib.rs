//! Client side of the aggregation pipeline: talks to an ERDDAP server,
//! derives column semantics from dataset metadata and finds where a
//! feed's data begins.

pub mod client;
pub mod error;
pub mod locator;
pub mod metadata;
pub mod models;
pub mod server;
pub mod window;

pub use client::{Fetched, HttpTransport, Transport, quote_plus};
pub use error::{Error, Result};
pub use locator::{Located, Probe, TabledapProbe, TimeRangeLocator};
pub use metadata::{Column, MetadataCatalog, SemanticType, normalize_name, table_name_for};
pub use models::{DatasetInfo, Record, Table};
pub use server::{Dataset, Server};
pub use window::TimeWindow;
