use aggregate::{AggregateQuery, JoinStrategy, LocalStore, Period, ResultSet, Schema, StreamingIngestor};
use anyhow::Result;
use chrono::NaiveDate;
use erddap::{Column, Fetched, SemanticType, TimeWindow, Transport};
use rusqlite::types::Value;
use std::io::Cursor;

/// Serves the same CSV body for every request.
struct Csv(String);

impl Transport for Csv {
    fn get(&self, _url: &str) -> erddap::Result<Fetched> {
        Ok(Fetched::Body(Box::new(Cursor::new(self.0.clone().into_bytes()))))
    }
}

fn schema() -> Schema {
    let mut station = Column::new("station", SemanticType::String);
    station.is_identifier = true;
    Schema::build(
        "buoys",
        &[
            station,
            Column::new("time", SemanticType::Timestamp),
            Column::new("temp", SemanticType::Double),
            Column::new("wind", SemanticType::Double),
        ],
    )
    .unwrap()
}

/// Load `lines` (station,time,temp,wind) into a store and aggregate them.
fn aggregate(lines: &[&str], period: Period, join: JoinStrategy) -> Result<ResultSet> {
    let schema = schema();
    let body = format!("station,time,temp,wind\n,UTC,degree_C,m/s\n{}\n", lines.join("\n"));
    let transport = Csv(body);
    let mut store = LocalStore::in_memory(&schema)?;

    let january = TimeWindow::new(
        NaiveDate::from_ymd_opt(2016, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2016, 2, 1).unwrap(),
    );
    StreamingIngestor::new(&transport, "http://host/erddap/tabledap/buoys")
        .indexed_by(period)
        .ingest(&schema, january, &[], &mut store)?;

    let query = AggregateQuery::build(&schema, period, join)?;
    Ok(store.query(&query.to_sql())?)
}

fn real(result: &ResultSet, row: usize, column: &str) -> Option<f64> {
    match result.rows[row][result.column_index(column).unwrap()] {
        Value::Real(v) => Some(v),
        Value::Integer(v) => Some(v as f64),
        _ => None,
    }
}

fn text(result: &ResultSet, row: usize, column: &str) -> Option<String> {
    match &result.rows[row][result.column_index(column).unwrap()] {
        Value::Text(v) => Some(v.clone()),
        _ => None,
    }
}

fn row_at(result: &ResultSet, time: &str) -> usize {
    (0..result.rows.len())
        .find(|&i| text(result, i, "time").as_deref() == Some(time))
        .unwrap()
}

#[test]
fn test_daily_statistics_for_one_station() -> Result<()> {
    let result = aggregate(
        &[
            "A,2016-01-05T06:00:00Z,10,NaN",
            "A,2016-01-05T18:00:00Z,20,NaN",
        ],
        Period::Daily,
        JoinStrategy::Grouped,
    )?;

    assert_eq!(result.rows.len(), 1);
    assert_eq!(text(&result, 0, "station").as_deref(), Some("A"));
    assert_eq!(text(&result, 0, "time").as_deref(), Some("2016-01-05T12:00:00Z"));
    assert_eq!(real(&result, 0, "mean_temp"), Some(15.0));
    assert_eq!(real(&result, 0, "minimum_temp"), Some(10.0));
    assert_eq!(real(&result, 0, "maximum_temp"), Some(20.0));
    let stdev = real(&result, 0, "stdev_temp").unwrap();
    assert!((stdev - 7.0710678).abs() < 1e-6, "stdev {stdev}");
    assert_eq!(text(&result, 0, "minimum_temp_time").as_deref(), Some("2016-01-05T06:00:00Z"));
    assert_eq!(text(&result, 0, "maximum_temp_time").as_deref(), Some("2016-01-05T18:00:00Z"));

    // wind was missing throughout
    assert_eq!(real(&result, 0, "mean_wind"), None);
    assert_eq!(real(&result, 0, "stdev_wind"), None);
    Ok(())
}

#[test]
fn test_missing_values_are_excluded() -> Result<()> {
    let result = aggregate(
        &[
            "A,2016-01-05T06:00:00Z,10,1",
            "A,2016-01-05T09:00:00Z,NaN,1",
            "A,2016-01-05T12:00:00Z,,1",
            "A,2016-01-05T18:00:00Z,20,1",
        ],
        Period::Daily,
        JoinStrategy::Grouped,
    )?;

    assert_eq!(result.rows.len(), 1);
    assert_eq!(real(&result, 0, "mean_temp"), Some(15.0));
    assert_eq!(real(&result, 0, "minimum_temp"), Some(10.0));
    let stdev = real(&result, 0, "stdev_temp").unwrap();
    assert!((stdev - 50f64.sqrt()).abs() < 1e-9);
    assert_eq!(real(&result, 0, "stdev_wind"), Some(0.0));
    Ok(())
}

#[test]
fn test_single_value_has_no_stdev() -> Result<()> {
    let result = aggregate(&["A,2016-01-05T06:00:00Z,10,1"], Period::Daily, JoinStrategy::Grouped)?;
    assert_eq!(real(&result, 0, "mean_temp"), Some(10.0));
    assert_eq!(real(&result, 0, "stdev_temp"), None);
    Ok(())
}

const PATCHY: [&str; 3] = [
    "A,2016-01-05T00:00:00Z,10,3",
    "A,2016-01-06T00:00:00Z,NaN,4",
    "B,2016-01-05T00:00:00Z,11,5",
];

#[test]
fn test_anchored_join_drops_buckets_without_anchor() -> Result<()> {
    let result = aggregate(&PATCHY, Period::Daily, JoinStrategy::Anchored)?;
    assert_eq!(result.rows.len(), 2);
    assert!(result.column("time").unwrap().iter().all(|t| **t == Value::Text("2016-01-05T00:00:00Z".into())));
    Ok(())
}

#[test]
fn test_anchored_join_keeps_bucket_missing_other_columns() -> Result<()> {
    let result = aggregate(
        &[
            "A,2016-01-05T00:00:00Z,10,NaN",
            "A,2016-01-05T06:00:00Z,12,NaN",
        ],
        Period::Daily,
        JoinStrategy::Anchored,
    )?;

    assert_eq!(result.rows.len(), 1);
    assert_eq!(real(&result, 0, "mean_temp"), Some(11.0));
    assert_eq!(text(&result, 0, "time").as_deref(), Some("2016-01-05T03:00:00Z"));
    assert_eq!(real(&result, 0, "mean_wind"), None);
    assert_eq!(text(&result, 0, "maximum_wind_time"), None);
    Ok(())
}

#[test]
fn test_grouped_join_keeps_every_bucket() -> Result<()> {
    let result = aggregate(&PATCHY, Period::Daily, JoinStrategy::Grouped)?;
    assert_eq!(result.rows.len(), 3);

    let day6 = row_at(&result, "2016-01-06T00:00:00Z");
    assert_eq!(text(&result, day6, "station").as_deref(), Some("A"));
    assert_eq!(real(&result, day6, "mean_temp"), None);
    assert_eq!(real(&result, day6, "mean_wind"), Some(4.0));
    assert_eq!(text(&result, day6, "maximum_wind_time").as_deref(), Some("2016-01-06T00:00:00Z"));
    Ok(())
}

#[test]
fn test_monthly_bucket_spans_days() -> Result<()> {
    let result = aggregate(&PATCHY, Period::Monthly, JoinStrategy::Grouped)?;
    assert_eq!(result.rows.len(), 2);
    let stations: Vec<String> = (0..2).filter_map(|i| text(&result, i, "station")).collect();
    assert!(stations.contains(&"A".to_string()) && stations.contains(&"B".to_string()));

    let a = (0..2).find(|&i| text(&result, i, "station").as_deref() == Some("A")).unwrap();
    assert_eq!(real(&result, a, "mean_wind"), Some(3.5));
    assert_eq!(text(&result, a, "time").as_deref(), Some("2016-01-05T12:00:00Z"));
    Ok(())
}
