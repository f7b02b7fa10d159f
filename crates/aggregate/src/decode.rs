//! Decoding of tabledap CSV responses into local rows.
//!
//! A `.csv` response has a header line with column names and a second
//! line with units, then one line per observation in the requested field
//! order. Fields are decoded positionally with `arrow-csv`; `NaN` and empty
//! fields become nulls.

use crate::error::{Error, Result};
use crate::schema::{Schema, SchemaColumn};
use crate::store::Row;
use arrow::array::{Array, AsArray, RecordBatch};
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema as ArrowSchema, SchemaRef};
use arrow_csv::ReaderBuilder;
use chrono::{DateTime, Utc};
use erddap::SemanticType;
use erddap::window::{format_timestamp, parse_timestamp};
use regex::Regex;
use rusqlite::types::Value;
use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;

/// Lines preceding the data in a tabledap CSV response.
pub const HEADER_LINES: usize = 2;

const NULL_PATTERN: &str = r"^(NaN)?$";

/// Arrow type used to decode a remote column.
pub fn arrow_type(semantic_type: SemanticType) -> DataType {
    match semantic_type {
        SemanticType::Float | SemanticType::Double => DataType::Float64,
        SemanticType::Int => DataType::Int64,
        SemanticType::String | SemanticType::Timestamp => DataType::Utf8,
    }
}

/// Layout of the CSV fields: the schema's remote columns in order.
pub fn csv_schema(schema: &Schema) -> SchemaRef {
    let fields: Vec<Field> = schema
        .remote_columns()
        .map(|c| Field::new(&c.normalized_name, arrow_type(c.semantic_type), true))
        .collect();
    Arc::new(ArrowSchema::new(fields))
}

/// Streaming reader over one CSV response.
pub type CsvBatches<R> = arrow_csv::reader::BufReader<BufReader<R>>;

/// Skip the header lines and start decoding `body` in batches of `batch_size`.
pub fn csv_batches<R: Read>(schema: &Schema, body: R, batch_size: usize) -> Result<CsvBatches<R>> {
    let mut reader = BufReader::new(body);
    let mut line = String::new();
    for _ in 0..HEADER_LINES {
        line.clear();
        reader.read_line(&mut line)?;
    }

    #[allow(clippy::unwrap_used)]
    let null_regex = Regex::new(NULL_PATTERN).unwrap();
    let batches = ReaderBuilder::new(csv_schema(schema))
        .with_header(false)
        .with_batch_size(batch_size.max(1))
        .with_null_regex(null_regex)
        .build_buffered(reader)?;
    Ok(batches)
}

/// Where a value of the local row comes from.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Field(usize),
    Time(usize),
    Bucket(crate::period::Period),
}

/// Converts decoded CSV batches into rows aligned with the schema,
/// filling the bucket columns from `time`.
#[derive(Debug)]
pub struct RowDecoder {
    slots: Vec<Slot>,
    time_field: usize,
}

/// Rows decoded from one batch, plus how many were dropped.
#[derive(Debug, Default)]
pub struct Decoded {
    pub rows: Vec<Row>,
    pub skipped: usize,
}

impl RowDecoder {
    pub fn new(schema: &Schema) -> Result<Self> {
        let time_name = schema.time_column()?.normalized_name.clone();
        let mut field = 0;
        let mut time_field = 0;
        let slots = schema
            .columns()
            .iter()
            .map(|column| match column {
                SchemaColumn::Bucket(period) => Slot::Bucket(*period),
                SchemaColumn::Remote(remote) => {
                    let slot = if remote.normalized_name == time_name {
                        time_field = field;
                        Slot::Time(field)
                    } else {
                        Slot::Field(field)
                    };
                    field += 1;
                    slot
                }
            })
            .collect();
        Ok(Self { slots, time_field })
    }

    /// Rows with a missing or unparseable `time` are skipped.
    pub fn decode(&self, batch: &RecordBatch) -> Result<Decoded> {
        let mut decoded = Decoded::default();
        let Some(times) = batch.column(self.time_field).as_string_opt::<i32>() else {
            let found = batch.column(self.time_field).data_type().to_string();
            return Err(Error::Schema(format!("time field decoded as {found}, expected text")));
        };

        for i in 0..batch.num_rows() {
            let time = if times.is_null(i) {
                None
            } else {
                parse_timestamp(times.value(i)).ok()
            };
            let Some(time) = time else {
                decoded.skipped += 1;
                continue;
            };
            decoded.rows.push(self.row(batch, i, &time));
        }
        Ok(decoded)
    }

    fn row(&self, batch: &RecordBatch, i: usize, time: &DateTime<Utc>) -> Row {
        self.slots
            .iter()
            .map(|slot| match slot {
                Slot::Time(_) => Value::Text(format_timestamp(time)),
                Slot::Bucket(period) => Value::Text(period.bucket(time)),
                Slot::Field(field) => cell(batch.column(*field).as_ref(), i),
            })
            .collect()
    }
}

fn cell(array: &dyn Array, i: usize) -> Value {
    if array.is_null(i) {
        return Value::Null;
    }
    match array.data_type() {
        DataType::Float64 => Value::Real(array.as_primitive::<Float64Type>().value(i)),
        DataType::Int64 => Value::Integer(array.as_primitive::<Int64Type>().value(i)),
        _ => Value::Text(array.as_string::<i32>().value(i).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array, StringArray};
    use erddap::Column;
    use std::io::Cursor;

    fn schema() -> Schema {
        let mut station = Column::new("station_id", SemanticType::String);
        station.is_identifier = true;
        Schema::build(
            "buoys",
            &[
                station,
                Column::new("time", SemanticType::Timestamp),
                Column::new("SeaTemperature", SemanticType::Float),
                Column::new("Count", SemanticType::Int),
            ],
        )
        .unwrap()
    }

    const BODY: &str = "station_id,time,Count,SeaTemperature\n\
                        ,UTC,,degree_C\n\
                        M2,2016-01-01T00:00:00Z,3,10.5\n\
                        M2,2016-01-01T01:00:00Z,NaN,NaN\n\
                        M3,,1,9.0\n\
                        M3,2016-01-02T00:30:00Z,,11\n";

    fn decode_all(body: &str, batch_size: usize) -> Decoded {
        let schema = schema();
        let decoder = RowDecoder::new(&schema).unwrap();
        let mut all = Decoded::default();
        for batch in csv_batches(&schema, Cursor::new(body.to_string()), batch_size).unwrap() {
            let decoded = decoder.decode(&batch.unwrap()).unwrap();
            all.rows.extend(decoded.rows);
            all.skipped += decoded.skipped;
        }
        all
    }

    #[test]
    fn test_field_order_follows_schema() {
        let schema = schema();
        let names: Vec<String> = csv_schema(&schema)
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, vec!["station_id", "time", "count", "sea_temperature"]);
    }

    #[test]
    fn test_decode_rows_with_buckets() {
        let decoded = decode_all(BODY, 2);
        assert_eq!(decoded.rows.len(), 3);
        assert_eq!(decoded.skipped, 1);

        let first = &decoded.rows[0];
        assert_eq!(
            first,
            &vec![
                Value::Text("M2".into()),
                Value::Text("2016-01-01T00:00:00Z".into()),
                Value::Text("2016-01-01T0000".into()),
                Value::Text("2016-01-01T00".into()),
                Value::Text("2016-01-01".into()),
                Value::Text("2015-53".into()),
                Value::Text("2016-01".into()),
                Value::Integer(3),
                Value::Real(10.5),
            ]
        );
    }

    #[test]
    fn test_missing_values_are_null() {
        let decoded = decode_all(BODY, 1000);
        let nan_row = &decoded.rows[1];
        assert_eq!(nan_row[7], Value::Null);
        assert_eq!(nan_row[8], Value::Null);

        let empty_count = &decoded.rows[2];
        assert_eq!(empty_count[7], Value::Null);
        assert_eq!(empty_count[8], Value::Real(11.0));
    }

    #[test]
    fn test_bad_number_is_a_decode_error() {
        let schema = schema();
        let body = "h\nu\nM2,2016-01-01T00:00:00Z,three,1.0\n";
        let mut batches = csv_batches(&schema, Cursor::new(body), 10).unwrap();
        assert!(batches.next().unwrap().is_err());
    }

    #[test]
    fn test_non_text_time_is_an_error() {
        let schema = schema();
        let decoder = RowDecoder::new(&schema).unwrap();
        let batch = RecordBatch::try_new(
            Arc::new(ArrowSchema::new(vec![
                Field::new("station_id", DataType::Utf8, true),
                Field::new("time", DataType::Float64, true),
                Field::new("count", DataType::Int64, true),
                Field::new("sea_temperature", DataType::Float64, true),
            ])),
            vec![
                Arc::new(StringArray::from(vec!["M2"])),
                Arc::new(Float64Array::from(vec![1451606400.0])),
                Arc::new(Int64Array::from(vec![1])),
                Arc::new(Float64Array::from(vec![10.0])),
            ],
        )
        .unwrap();
        assert!(matches!(decoder.decode(&batch), Err(Error::Schema(_))));
    }

    #[test]
    fn test_time_declared_numeric_still_decodes() {
        let schema = Schema::build(
            "b",
            &[
                Column::new("time", SemanticType::Double),
                Column::new("temp", SemanticType::Double),
            ],
        )
        .unwrap();
        let decoder = RowDecoder::new(&schema).unwrap();
        let body = "time,temp\nUTC,c\n2016-01-01T00:00:00Z,10\n";
        let mut rows = Vec::new();
        for batch in csv_batches(&schema, Cursor::new(body), 10).unwrap() {
            rows.extend(decoder.decode(&batch.unwrap()).unwrap().rows);
        }
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], Value::Text("2016-01-01T00:00:00Z".into()));
        assert_eq!(rows[0][6], Value::Real(10.0));
    }

    #[test]
    fn test_header_only_body_has_no_rows() {
        let decoded = decode_all("station_id,time,Count,SeaTemperature\n,UTC,,degree_C\n", 10);
        assert!(decoded.rows.is_empty());
        assert_eq!(decoded.skipped, 0);
    }
}
