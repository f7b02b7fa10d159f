//! Column semantics derived from a dataset's self-describing metadata.
//!
//! ERDDAP's info endpoint returns a flat list of records: one `variable`
//! record per column (with its declared data type) and any number of
//! `attribute` records hanging off a variable or off `NC_GLOBAL`. The
//! catalog turns that list into typed [`Column`] descriptors:
//!
//! - `ioos_category = Identifier` marks a key column,
//! - `ioos_category = Quality` marks a quality flag,
//! - an `axis` attribute marks a coordinate axis and, for the known axis
//!   names, renames/retypes the column to its canonical form,
//! - `units` is carried along.

use crate::client::{Transport, require_table};
use crate::error::Result;
use crate::models::{DatasetInfo, Record};
use diagnostics::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

const ROW_TYPE: &str = "Row Type";
const VARIABLE_NAME: &str = "Variable Name";
const ATTRIBUTE_NAME: &str = "Attribute Name";
const VALUE: &str = "Value";
const DATA_TYPE: &str = "Data Type";

/// Pseudo-variable holding dataset-wide attributes.
pub const GLOBAL: &str = "NC_GLOBAL";

/// Storage type of a column, collapsed from the feed's declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Float,
    Double,
    Int,
    String,
    Timestamp,
}

impl SemanticType {
    /// Map an ERDDAP data type name. Unknown names are treated as text.
    pub fn from_remote(data_type: &str) -> Self {
        match data_type.trim().to_ascii_lowercase().as_str() {
            "float" => SemanticType::Float,
            "double" => SemanticType::Double,
            "byte" | "ubyte" | "short" | "ushort" | "int" | "uint" | "long" | "ulong"
            | "boolean" => SemanticType::Int,
            _ => SemanticType::String,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            SemanticType::Float | SemanticType::Double | SemanticType::Int
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SemanticType::Float => "float",
            SemanticType::Double => "double",
            SemanticType::Int => "int",
            SemanticType::String => "string",
            SemanticType::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed variable of a remote dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub remote_name: String,
    pub normalized_name: String,
    pub semantic_type: SemanticType,
    pub is_identifier: bool,
    pub is_quality: bool,
    pub is_axis: bool,
    pub units: Option<String>,
}

impl Column {
    /// A plain column with no flags set, named from `remote_name`.
    pub fn new(remote_name: &str, semantic_type: SemanticType) -> Self {
        Self {
            remote_name: remote_name.to_string(),
            normalized_name: normalize_name(remote_name),
            semantic_type,
            is_identifier: false,
            is_quality: false,
            is_axis: false,
            units: None,
        }
    }
}

/// Canonical name and type for a value of the `axis` attribute.
pub fn canonical_axis(axis: &str) -> Option<(&'static str, SemanticType)> {
    match axis {
        "Time" | "T" => Some(("time", SemanticType::Timestamp)),
        "Lon" | "X" => Some(("longitude", SemanticType::Double)),
        "Lat" | "Y" => Some(("latitude", SemanticType::Double)),
        "Alt" => Some(("altitude", SemanticType::Double)),
        _ => None,
    }
}

#[allow(clippy::unwrap_used)]
static ACRONYM_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").unwrap());
#[allow(clippy::unwrap_used)]
static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z\d])([A-Z])").unwrap());

/// Lowercase, underscore-separated form of a remote name:
/// `seaTemperature` -> `sea_temperature`, `CTDTemp` -> `ctd_temp`,
/// `wind-speed` -> `wind_speed`.
pub fn normalize_name(name: &str) -> String {
    let step = ACRONYM_BOUNDARY.replace_all(name, "${1}_${2}");
    let step = CAMEL_BOUNDARY.replace_all(&step, "${1}_${2}");
    step.replace('-', "_").to_lowercase()
}

/// Local table name for a dataset id: the normalized last path segment.
pub fn table_name_for(dataset_id: &str) -> String {
    let normalized = normalize_name(dataset_id);
    normalized
        .rsplit('/')
        .next()
        .unwrap_or(normalized.as_str())
        .to_string()
}

/// Raw metadata records of one dataset, with the derived views over them.
#[derive(Debug, Clone, Default)]
pub struct MetadataCatalog {
    records: Vec<Record>,
}

impl MetadataCatalog {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Fetch `{metadata}.json`. Any failure, including a non-success
    /// status, is an error: without metadata there is no schema.
    pub fn fetch<T: Transport + ?Sized>(transport: &T, info: &DatasetInfo) -> Result<Self> {
        let url = format!("{}.json", info.metadata);
        let records = require_table(transport, &url)?.into_records();
        let count = records.len();
        let dataset_id = info.dataset_id.as_str();
        debug!("Fetched {count} metadata records for {dataset_id}");
        Ok(Self::new(records))
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    fn attribute_records(&self) -> impl Iterator<Item = &Record> {
        self.records
            .iter()
            .filter(|r| field(r, ROW_TYPE) == Some("attribute"))
    }

    /// Names of variables having `attribute = value`.
    fn variables_with(&self, attribute: &str, value: &str) -> BTreeSet<&str> {
        self.attribute_records()
            .filter(|r| field(r, ATTRIBUTE_NAME) == Some(attribute) && field(r, VALUE) == Some(value))
            .filter_map(|r| field(r, VARIABLE_NAME))
            .collect()
    }

    /// First value of `attribute` for every variable declaring it.
    fn attribute_map(&self, attribute: &str) -> BTreeMap<&str, &str> {
        let mut map = BTreeMap::new();
        for record in self.attribute_records() {
            if field(record, ATTRIBUTE_NAME) != Some(attribute) {
                continue;
            }
            if let (Some(variable), Some(value)) = (field(record, VARIABLE_NAME), field(record, VALUE)) {
                map.entry(variable).or_insert(value);
            }
        }
        map
    }

    pub fn identifiers(&self) -> BTreeSet<&str> {
        self.variables_with("ioos_category", "Identifier")
    }

    pub fn quality_flags(&self) -> BTreeSet<&str> {
        self.variables_with("ioos_category", "Quality")
    }

    /// Variable name to its raw `axis` attribute value.
    pub fn axis_map(&self) -> BTreeMap<&str, &str> {
        self.attribute_map("axis")
    }

    pub fn units_map(&self) -> BTreeMap<&str, &str> {
        self.attribute_map("units")
    }

    /// Every attribute of every variable, keyed by remote variable name.
    pub fn attributes(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut all: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for record in self.attribute_records() {
            if let (Some(variable), Some(name), Some(value)) = (
                field(record, VARIABLE_NAME),
                field(record, ATTRIBUTE_NAME),
                field(record, VALUE),
            ) {
                all.entry(variable.to_string())
                    .or_default()
                    .entry(name.to_string())
                    .or_insert_with(|| value.to_string());
            }
        }
        all
    }

    /// Dataset-wide attributes (`NC_GLOBAL`): title, time coverage, provenance.
    pub fn summary(&self) -> BTreeMap<String, String> {
        self.attributes().remove(GLOBAL).unwrap_or_default()
    }

    /// Typed columns, identifiers first, then by normalized name.
    pub fn columns(&self) -> Vec<Column> {
        let identifiers = self.identifiers();
        let quality = self.quality_flags();
        let axes = self.axis_map();
        let units = self.units_map();

        let mut columns: Vec<Column> = self
            .records
            .iter()
            .filter(|r| field(r, ROW_TYPE) == Some("variable"))
            .filter_map(|record| {
                let name = field(record, VARIABLE_NAME)?;
                let declared = field(record, DATA_TYPE).unwrap_or("String");
                let mut column = Column::new(name, SemanticType::from_remote(declared));
                column.is_identifier = identifiers.contains(name);
                column.is_quality = quality.contains(name);
                column.units = units.get(name).map(|u| u.to_string());

                if let Some(&axis) = axes.get(name) {
                    column.is_axis = true;
                    match canonical_axis(axis) {
                        Some((canonical, semantic_type)) => {
                            column.normalized_name = canonical.to_string();
                            column.semantic_type = semantic_type;
                        }
                        None => {
                            debug!("Axis {axis} of {name} has no canonical mapping, keeping its own name");
                        }
                    }
                }
                Some(column)
            })
            .collect();

        columns.sort_by(|a, b| {
            b.is_identifier
                .cmp(&a.is_identifier)
                .then_with(|| a.normalized_name.cmp(&b.normalized_name))
        });
        disambiguate(&mut columns);
        columns
    }
}

fn field<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record.get(key).map(String::as_str)
}

/// Suffix repeated normalized names (`temp`, `temp_2`, ...). The first
/// occurrence in sorted order keeps the plain name.
fn disambiguate(columns: &mut [Column]) {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for column in columns.iter_mut() {
        if seen.insert(column.normalized_name.clone()) {
            continue;
        }
        let base = column.normalized_name.clone();
        let mut n = 2;
        while seen.contains(&format!("{base}_{n}")) {
            n += 1;
        }
        let renamed = format!("{base}_{n}");
        let remote = column.remote_name.as_str();
        warn!("Column {remote} collides on {base}, stored as {renamed}");
        seen.insert(renamed.clone());
        column.normalized_name = renamed;
    }
}
