use anyhow::Result;
use chrono::NaiveDate;
use erddap::{Error, SemanticType, Server};

mod mock_server;
use mock_server::{BASE, MockErddap};

#[test]
fn test_list_timeseries_and_point_datasets() -> Result<()> {
    let server = Server::new(BASE, MockErddap::new());
    let datasets = server.datasets()?;

    let ids: Vec<&str> = datasets.iter().map(|d| d.dataset_id.as_str()).collect();
    assert_eq!(ids, vec!["IWBNetwork", "IrishNationalTideGaugeNetwork", "imi_ctd_casts"]);
    assert_eq!(datasets[0].title.as_deref(), Some("Irish Weather Buoy Network"));
    assert_eq!(datasets[0].tabledap, format!("{BASE}/tabledap/IWBNetwork"));
    Ok(())
}

#[test]
fn test_unknown_dataset_lists_known_ids() -> Result<()> {
    let server = Server::new(BASE, MockErddap::new());
    match server.dataset("NoSuchBuoy") {
        Err(Error::UnknownDataset { id, known }) => {
            assert_eq!(id, "NoSuchBuoy");
            assert!(known.contains(&"IWBNetwork".to_string()));
        }
        other => panic!("expected UnknownDataset, got {:?}", other.map(|d| d.id().to_string())),
    }

    let message = server.dataset("NoSuchBuoy").err().unwrap().to_string();
    assert!(message.starts_with("Unknown timeseries NoSuchBuoy, try one of these: ["));
    Ok(())
}

#[test]
fn test_dataset_columns_from_metadata() -> Result<()> {
    let server = Server::new(BASE, MockErddap::new());
    let dataset = server.dataset("IWBNetwork")?;

    assert_eq!(dataset.table_name(), "iwb_network");
    assert_eq!(dataset.time_column()?, "time");

    let columns = dataset.columns()?;
    let names: Vec<&str> = columns.iter().map(|c| c.normalized_name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "station_id",
            "atmospheric_pressure",
            "latitude",
            "longitude",
            "qc_flag",
            "sea_temperature",
            "time",
            "wind_speed"
        ]
    );
    assert!(columns[0].is_identifier);
    let time = columns.iter().find(|c| c.normalized_name == "time").unwrap();
    assert_eq!(time.semantic_type, SemanticType::Timestamp);
    let pressure = columns.iter().find(|c| c.remote_name == "AtmosphericPressure").unwrap();
    assert_eq!(pressure.semantic_type, SemanticType::Float);
    assert_eq!(pressure.units.as_deref(), Some("mb"));
    Ok(())
}

#[test]
fn test_metadata_fetched_once_per_handle() -> Result<()> {
    let server = Server::new(BASE, MockErddap::new());
    let dataset = server.dataset("IWBNetwork")?;
    dataset.columns()?;
    dataset.time_column()?;
    dataset.summary()?;
    dataset.earliest_time()?;
    assert_eq!(server.transport().requests_to("/info/IWBNetwork/index.json"), 1);
    Ok(())
}

#[test]
fn test_declared_coverage_skips_search() -> Result<()> {
    let server = Server::new(BASE, MockErddap::new().with_feed_start("1995-01-01T00:00:00Z"));
    let dataset = server.dataset("IWBNetwork")?;
    let earliest = dataset.earliest_time()?;

    assert_eq!(erddap::window::format_timestamp(&earliest), "2001-02-06T13:00:00Z");
    assert_eq!(server.transport().probe_count(), 0);
    Ok(())
}

#[test]
fn test_earliest_time_searched_when_undeclared() -> Result<()> {
    let server = Server::new(
        BASE,
        MockErddap::new().with_feed_start("2007-09-12T08:00:00Z"),
    );
    let dataset = server.dataset("IrishNationalTideGaugeNetwork")?;
    let today = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();

    let earliest = dataset.earliest_time_at(today)?;
    assert_eq!(erddap::window::format_timestamp(&earliest), "2007-09-12T08:00:00Z");

    let probes = server.transport().probe_count();
    assert!(probes > 0 && probes <= 9, "{probes} probes");

    // memoized: no further probes
    dataset.earliest_time_at(today)?;
    assert_eq!(server.transport().probe_count(), probes);
    Ok(())
}

#[test]
fn test_missing_metadata_is_an_error() -> Result<()> {
    let server = Server::new(BASE, MockErddap::new());
    let dataset = server.dataset("imi_ctd_casts")?;
    assert!(matches!(dataset.columns(), Err(Error::Status { status: 404, .. })));
    Ok(())
}
