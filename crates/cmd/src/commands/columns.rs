use aggregate::{Schema, SchemaColumn};
use anyhow::Result;
use erddap::{Server, Transport};
use std::io::Write;

fn role(column: &SchemaColumn) -> String {
    let Some(remote) = column.remote() else {
        return "bucket".to_string();
    };
    let mut roles = Vec::new();
    if remote.is_identifier {
        roles.push("identifier");
    }
    if remote.is_axis {
        roles.push("axis");
    }
    if remote.is_quality {
        roles.push("quality");
    }
    roles.join(",")
}

/// The local table derived for `series`, in storage order.
pub fn columns_command<T: Transport>(server: &Server<T>, series: &str, out: &mut impl Write) -> Result<()> {
    let dataset = server.dataset(series)?;
    let schema = Schema::build(&dataset.table_name(), dataset.columns()?)?;

    writeln!(out, "{}", schema.table_name())?;
    for column in schema.columns() {
        let source = column.remote().map(|c| c.remote_name.as_str()).unwrap_or("");
        let units = column.remote().and_then(|c| c.units.as_deref()).unwrap_or("");
        writeln!(
            out,
            "  {:<28} {:<10} {:<28} {:<20} {units}",
            column.name(),
            column.semantic_type().as_str(),
            source,
            role(column)
        )?;
    }
    Ok(())
}
