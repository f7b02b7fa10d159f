use anyhow::{Context, Result};
use diagnostics::*;
use std::io::Write;
use std::path::Path;

use crate::config::create_example_config;

pub fn init_command(config_path: &Path, out: &mut impl Write) -> Result<()> {
    let display = config_path.display().to_string();
    if config_path.exists() {
        info!("Configuration file already exists: {display}");
        writeln!(out, "Configuration file already exists: {display}")?;
        writeln!(out, "Delete it first if you want to create a new one.")?;
        return Ok(());
    }

    create_example_config(config_path)
        .with_context(|| format!("Failed to create configuration file: {display}"))?;

    info!("Created example configuration file: {display}");
    writeln!(out, "Created example configuration file: {display}")?;
    writeln!(out, "Edit server, data_dir and dataset_dir before aggregating.")?;
    Ok(())
}
