use aggregate::{IngestOptions, JoinStrategy, RunSettings};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use erddap::TimeRangeLocator;
use erddap::window::parse_start_date;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the earliest-time search starts and how far each probe reaches.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LocatorConfig {
    /// `YYYY-MM` or `YYYY-MM-DD`.
    pub earliest: String,
    pub stride_days: u32,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            earliest: "1990-01-01".to_string(),
            stride_days: 60,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// ERDDAP base URL, ending in `/erddap`.
    pub server: String,
    /// Root of the Parquet output tree.
    pub data_dir: PathBuf,
    /// Where descriptor fragments are written.
    pub dataset_dir: PathBuf,
    /// Where the per-run local store is created.
    pub work_dir: PathBuf,
    pub http_timeout_secs: Option<u64>,
    pub join: JoinStrategy,
    pub ingest: IngestOptions,
    pub locator: LocatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: "http://erddap.marine.ie/erddap".to_string(),
            data_dir: PathBuf::from("/opt/aggrerddap/data"),
            dataset_dir: PathBuf::from("/opt/aggrerddap/config"),
            work_dir: std::env::temp_dir(),
            http_timeout_secs: None,
            join: JoinStrategy::default(),
            ingest: IngestOptions::default(),
            locator: LocatorConfig::default(),
        }
    }
}

impl Config {
    pub fn locator(&self) -> Result<TimeRangeLocator> {
        let earliest: NaiveDate = parse_start_date(&self.locator.earliest)
            .with_context(|| "Invalid locator.earliest")?;
        Ok(TimeRangeLocator::new(earliest, self.locator.stride_days))
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }

    pub fn run_settings(&self, join: Option<JoinStrategy>) -> RunSettings {
        RunSettings {
            work_dir: self.work_dir.clone(),
            ingest: self.ingest,
            join: join.unwrap_or(self.join),
        }
    }
}

/// Load configuration from YAML file. A missing file gives the defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = serde_yaml_ng::from_str(&content)
        .with_context(|| format!("Failed to parse YAML configuration: {}", path.display()))?;

    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.trim().is_empty() {
        anyhow::bail!("server cannot be empty");
    }

    if config.ingest.stride_days == 0 {
        anyhow::bail!("ingest.stride_days must be greater than 0");
    }

    if config.ingest.batch_size == 0 {
        anyhow::bail!("ingest.batch_size must be greater than 0");
    }

    if config.ingest.commit_interval == 0 {
        anyhow::bail!("ingest.commit_interval must be greater than 0");
    }

    if config.ingest.commit_interval < config.ingest.batch_size {
        anyhow::bail!(
            "ingest.commit_interval ({}) must be at least ingest.batch_size ({})",
            config.ingest.commit_interval,
            config.ingest.batch_size
        );
    }

    if config.locator.stride_days == 0 {
        anyhow::bail!("locator.stride_days must be greater than 0");
    }

    if config.http_timeout_secs == Some(0) {
        anyhow::bail!("http_timeout_secs must be greater than 0");
    }

    config.locator()?;
    Ok(())
}

/// Write a configuration holding the defaults, for the user to edit.
pub fn create_example_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    let yaml = serde_yaml_ng::to_string(&Config::default())
        .with_context(|| "Failed to serialize example configuration")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, yaml).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
