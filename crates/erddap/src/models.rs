use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of an ERDDAP table, keyed by column name.
///
/// Cells that were `null` in the response are absent.
pub type Record = BTreeMap<String, String>;

/// The `.json` response shape shared by every tabledap and info endpoint.
#[derive(Deserialize, Debug)]
pub struct TableResponse {
    pub table: Table,
}

/// Column-oriented table as returned by ERDDAP.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub column_names: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl Table {
    /// Convert to one record per row. Short rows simply lack the trailing columns.
    pub fn into_records(self) -> Vec<Record> {
        let names = self.column_names;
        self.rows
            .into_iter()
            .map(|row| {
                names
                    .iter()
                    .zip(row)
                    .filter_map(|(name, cell)| cell_text(cell).map(|text| (name.clone(), text)))
                    .collect()
            })
            .collect()
    }

    /// The first cell of the named column, if any row exists.
    pub fn first_value(&self, column: &str) -> Option<String> {
        let idx = self.column_names.iter().position(|c| c == column)?;
        let row = self.rows.first()?;
        row.get(idx).cloned().and_then(cell_text)
    }
}

fn cell_text(cell: serde_json::Value) -> Option<String> {
    match cell {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// A dataset advertised by the server's `allDatasets` table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DatasetInfo {
    pub dataset_id: String,
    pub title: Option<String>,
    /// Base tabledap URL, without a file-type extension.
    pub tabledap: String,
    /// Base metadata (info) URL, without a file-type extension.
    pub metadata: String,
}

impl DatasetInfo {
    /// Build from an `allDatasets` record; records without an id or URLs are dropped.
    pub fn from_record(record: &Record) -> Option<Self> {
        Some(Self {
            dataset_id: record.get("datasetID")?.clone(),
            title: record.get("title").cloned(),
            tabledap: record.get("tabledap")?.clone(),
            metadata: record.get("metadata")?.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_records_skips_nulls() {
        let table: TableResponse = serde_json::from_value(json!({
            "table": {
                "columnNames": ["Row Type", "Variable Name", "Value"],
                "columnTypes": ["String", "String", "String"],
                "rows": [
                    ["attribute", "NC_GLOBAL", "Buoy data"],
                    ["variable", "time", null],
                    ["attribute", "depth", 12.5]
                ]
            }
        }))
        .unwrap();

        let records = table.table.into_records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["Value"], "Buoy data");
        assert!(!records[1].contains_key("Value"));
        assert_eq!(records[2]["Value"], "12.5");
    }

    #[test]
    fn test_dataset_info_requires_urls() {
        let mut record = Record::new();
        record.insert("datasetID".into(), "IWBNetwork".into());
        assert_eq!(DatasetInfo::from_record(&record), None);

        record.insert("tabledap".into(), "http://x/erddap/tabledap/IWBNetwork".into());
        record.insert("metadata".into(), "http://x/erddap/info/IWBNetwork/index".into());
        let info = DatasetInfo::from_record(&record).unwrap();
        assert_eq!(info.dataset_id, "IWBNetwork");
        assert_eq!(info.title, None);
    }
}
