//! Aggregated results as Parquet files, plus the ERDDAP dataset fragment
//! that serves them.

use crate::error::{Error, Result};
use crate::period::Period;
use crate::query::{AggregateQuery, OutputColumn, OutputKind, Statistic};
use crate::schema::Schema;
use crate::store::ResultSet;
use arrow::array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray, TimestampSecondArray};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema, TimeUnit};
use chrono::NaiveDate;
use diagnostics::*;
use erddap::SemanticType;
use erddap::window::parse_timestamp;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use rusqlite::types::Value;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tera::{Context, Tera};

pub type Attributes = BTreeMap<String, String>;

/// Attributes carried onto the output file and its columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputAttributes {
    pub global: Attributes,
    pub columns: BTreeMap<String, Attributes>,
}

impl OutputAttributes {
    /// Carry dataset metadata onto the aggregated columns.
    ///
    /// A variable's attributes go to its own output column and to each of
    /// its statistics, with `long_name`/`standard_name` prefixed by the
    /// statistic. `units` never goes to time columns. Global attributes
    /// are kept with the title rewritten for the period.
    pub fn propagate(
        query: &AggregateQuery,
        schema: &Schema,
        variables: &BTreeMap<String, Attributes>,
        summary: &Attributes,
    ) -> Self {
        let outputs: BTreeMap<&str, &OutputColumn> = query
            .output_columns()
            .iter()
            .map(|o| (o.name.as_str(), o))
            .collect();
        let mut columns: BTreeMap<String, Attributes> = BTreeMap::new();

        for (variable, attributes) in variables {
            let local = schema
                .remote_columns()
                .find(|c| c.remote_name == *variable)
                .map(|c| c.normalized_name.clone())
                .unwrap_or_else(|| erddap::normalize_name(variable));

            for (name, value) in attributes {
                if name == "units" && local.ends_with("time") {
                    continue;
                }
                if outputs.contains_key(local.as_str()) {
                    columns
                        .entry(local.clone())
                        .or_default()
                        .insert(name.clone(), value.clone());
                }
                for statistic in Statistic::ALL {
                    let target = statistic.column_name(&local);
                    if !outputs.contains_key(target.as_str()) {
                        continue;
                    }
                    let value = if name == "long_name" || name == "standard_name" {
                        format!("{} {value}", statistic.as_str())
                    } else {
                        value.clone()
                    };
                    columns.entry(target).or_default().insert(name.clone(), value);
                }
            }
        }

        for output in query.output_columns() {
            if let OutputKind::StatTime(_) = output.kind {
                let attributes = columns.entry(output.name.clone()).or_default();
                attributes.insert("ioos_category".into(), "Time".into());
                attributes.insert("long_name".into(), output.name.clone());
                attributes.insert("standard_name".into(), output.name.clone());
                attributes.insert("time_origin".into(), "01-JAN-1970 00:00:00".into());
            }
        }

        let mut global = summary.clone();
        if let Some(title) = summary.get("title") {
            global.insert(
                "title".into(),
                format!("{} aggregations of {title}", query.period.title()),
            );
        }

        Self { global, columns }
    }
}

fn arrow_type(output: &OutputColumn) -> DataType {
    match output.kind {
        OutputKind::Key(SemanticType::Int) => DataType::Int64,
        OutputKind::Key(SemanticType::Float | SemanticType::Double) => DataType::Float64,
        OutputKind::Key(_) => DataType::Utf8,
        OutputKind::Axis | OutputKind::Stat(_) => DataType::Float64,
        OutputKind::MeanTime | OutputKind::StatTime(_) => {
            DataType::Timestamp(TimeUnit::Second, Some("UTC".into()))
        }
    }
}

fn to_array(data_type: &DataType, values: Vec<&Value>) -> ArrayRef {
    match data_type {
        DataType::Int64 => Arc::new(Int64Array::from(
            values
                .into_iter()
                .map(|v| match v {
                    Value::Integer(i) => Some(*i),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Float64 => Arc::new(Float64Array::from(
            values
                .into_iter()
                .map(|v| match v {
                    Value::Real(f) => Some(*f),
                    Value::Integer(i) => Some(*i as f64),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Timestamp(_, _) => Arc::new(
            TimestampSecondArray::from(
                values
                    .into_iter()
                    .map(|v| match v {
                        Value::Text(s) => parse_timestamp(s).ok().map(|ts| ts.timestamp()),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            )
            .with_timezone("UTC"),
        ),
        _ => Arc::new(StringArray::from(
            values
                .into_iter()
                .map(|v| match v {
                    Value::Text(s) => Some(s.clone()),
                    Value::Integer(i) => Some(i.to_string()),
                    Value::Real(f) => Some(f.to_string()),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
    }
}

/// Typed batch of the query's output, with attributes as field and
/// schema metadata.
pub fn to_record_batch(
    query: &AggregateQuery,
    result: &ResultSet,
    attributes: &OutputAttributes,
) -> Result<RecordBatch> {
    let mut fields = Vec::new();
    let mut arrays = Vec::new();
    for output in query.output_columns() {
        let values = result
            .column(&output.name)
            .ok_or_else(|| Error::Schema(format!("query result lacks column {}", output.name)))?;
        let data_type = arrow_type(output);
        arrays.push(to_array(&data_type, values));

        let metadata: HashMap<String, String> = attributes
            .columns
            .get(&output.name)
            .map(|a| a.clone().into_iter().collect())
            .unwrap_or_default();
        fields.push(Field::new(&output.name, data_type, true).with_metadata(metadata));
    }

    let metadata: HashMap<String, String> = attributes.global.clone().into_iter().collect();
    let schema = Arc::new(ArrowSchema::new(fields).with_metadata(metadata));
    Ok(RecordBatch::try_new(schema, arrays)?)
}

/// Output dataset id: one per table and period.
pub fn dataset_id(table_name: &str, period: Period) -> String {
    format!("{table_name}_{period}")
}

/// `{data_dir}/{dataset_id}/`
pub fn file_dir(data_dir: &Path, dataset_id: &str) -> PathBuf {
    data_dir.join(dataset_id)
}

/// `{data_dir}/{dataset_id}/{YYYY}/{dataset_id}_{YYYY}_{MM}_{DD}.parquet`
pub fn output_path(data_dir: &Path, dataset_id: &str, start: NaiveDate) -> PathBuf {
    file_dir(data_dir, dataset_id)
        .join(start.format("%Y").to_string())
        .join(format!("{dataset_id}_{}.parquet", start.format("%Y_%m_%d")))
}

/// Write `batch` next to `path` and move it into place.
pub fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::try_new(6)?))
        .build();
    let file = File::create(&tmp)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;

    std::fs::rename(&tmp, path)?;
    let rows = batch.num_rows();
    let display = path.display().to_string();
    info!("Wrote {rows} rows to {display}");
    Ok(())
}

const DESCRIPTOR_TEMPLATE: &str = r#"<dataset type="EDDTableFromParquetFiles" datasetID="{{ dataset_id | escape_xml }}" active="true">
    <reloadEveryNMinutes>1440</reloadEveryNMinutes>
    <updateEveryNMillis>10000</updateEveryNMillis>
    <fileDir>{{ file_dir | escape_xml }}</fileDir>
    <fileNameRegex>.*\.parquet</fileNameRegex>
    <recursive>true</recursive>
    <pathRegex>.*</pathRegex>
    <metadataFrom>last</metadataFrom>
    <fileTableInMemory>false</fileTableInMemory>
    <accessibleViaFiles>true</accessibleViaFiles>
    <removeMVRows>true</removeMVRows>
    <addAttributes>
{% for name, value in global %}      <att name="{{ name | escape_xml }}">{{ value | escape_xml }}</att>
{% endfor %}    </addAttributes>
{% for variable in variables %}    <dataVariable>
        <sourceName>{{ variable.name | escape_xml }}</sourceName>
        <destinationName>{{ variable.name | escape_xml }}</destinationName>
        <dataType>{{ variable.data_type }}</dataType>
        <addAttributes>
{% for name, value in variable.attributes %}            <att name="{{ name | escape_xml }}">{{ value | escape_xml }}</att>
{% endfor %}        </addAttributes>
    </dataVariable>
{% endfor %}</dataset>
"#;

#[derive(Serialize)]
struct DescriptorVariable {
    name: String,
    data_type: &'static str,
    attributes: Attributes,
}

fn erddap_type(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Float32 => "float",
        DataType::Float64 => "double",
        DataType::Int64 => "long",
        DataType::Int32 => "int",
        _ => "String",
    }
}

/// The `<dataset>` fragment serving every file under `file_dir`, with
/// attributes taken from the batch's metadata.
pub fn render_descriptor(dataset_id: &str, file_dir: &Path, batch: &RecordBatch) -> Result<String> {
    let mut tera = Tera::default();
    tera.add_raw_template("dataset.part", DESCRIPTOR_TEMPLATE)?;

    let schema = batch.schema();
    let global: Attributes = schema
        .metadata()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let variables: Vec<DescriptorVariable> = schema
        .fields()
        .iter()
        .map(|field| DescriptorVariable {
            name: field.name().clone(),
            data_type: erddap_type(field.data_type()),
            attributes: field
                .metadata()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
        .collect();

    let mut dir = file_dir.display().to_string();
    if !dir.ends_with('/') {
        dir.push('/');
    }

    let mut ctx = Context::new();
    ctx.insert("dataset_id", dataset_id);
    ctx.insert("file_dir", &dir);
    ctx.insert("global", &global);
    ctx.insert("variables", &variables);
    Ok(tera.render("dataset.part", &ctx)?)
}

/// Write the fragment to `{dataset_dir}/{dataset_id}.part`.
pub fn write_descriptor(dataset_dir: &Path, dataset_id: &str, descriptor: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dataset_dir)?;
    let path = dataset_dir.join(format!("{dataset_id}.part"));
    std::fs::write(&path, descriptor)?;
    Ok(path)
}
