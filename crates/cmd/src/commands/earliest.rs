use anyhow::Result;
use erddap::window::format_timestamp;
use erddap::{Server, Transport};
use std::io::Write;

pub fn earliest_command<T: Transport>(server: &Server<T>, series: &str, out: &mut impl Write) -> Result<()> {
    let dataset = server.dataset(series)?;
    let earliest = dataset.earliest_time()?;
    writeln!(out, "{}", format_timestamp(&earliest))?;
    Ok(())
}
