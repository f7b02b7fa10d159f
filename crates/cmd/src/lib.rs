//! Command implementations for the `erddap-agg` binary. Each command
//! writes its report to the given writer.

pub mod commands;
pub mod config;

pub use config::{Config, create_example_config, load_config, validate_config};
