use anyhow::Result;
use erddap::{Server, Transport};
use std::io::Write;

/// One line per dataset: id, then title.
pub fn list_command<T: Transport>(server: &Server<T>, out: &mut impl Write) -> Result<()> {
    let mut datasets = server.datasets()?;
    datasets.sort_by(|a, b| a.dataset_id.cmp(&b.dataset_id));

    let width = datasets.iter().map(|d| d.dataset_id.len()).max().unwrap_or(0);
    for dataset in datasets {
        let title = dataset.title.as_deref().unwrap_or("");
        writeln!(out, "{:width$}  {title}", dataset.dataset_id)?;
    }
    Ok(())
}
