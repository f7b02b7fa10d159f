//! The local table layout derived from a dataset's columns.

use crate::error::{Error, Result};
use crate::period::Period;
use erddap::{Column, SemanticType};
use std::collections::BTreeSet;

/// One column of the local table: a remote variable or a bucket of `time`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaColumn {
    Remote(Column),
    Bucket(Period),
}

impl SchemaColumn {
    pub fn name(&self) -> &str {
        match self {
            SchemaColumn::Remote(column) => &column.normalized_name,
            SchemaColumn::Bucket(period) => period.as_str(),
        }
    }

    pub fn semantic_type(&self) -> SemanticType {
        match self {
            SchemaColumn::Remote(column) => column.semantic_type,
            SchemaColumn::Bucket(_) => SemanticType::String,
        }
    }

    pub fn remote(&self) -> Option<&Column> {
        match self {
            SchemaColumn::Remote(column) => Some(column),
            SchemaColumn::Bucket(_) => None,
        }
    }

    pub fn is_identifier(&self) -> bool {
        self.remote().is_some_and(|c| c.is_identifier)
    }

    /// Declared column type in the local store.
    pub fn sql_type(&self) -> &'static str {
        match self.semantic_type() {
            SemanticType::Float => "float",
            SemanticType::Double => "double",
            SemanticType::Int => "int",
            SemanticType::String => "text",
            SemanticType::Timestamp => "timestamp",
        }
    }
}

/// Ordered, immutable table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    table_name: String,
    columns: Vec<SchemaColumn>,
}

impl Schema {
    /// Order `columns` for storage:
    ///
    /// 1. identifiers and timestamp columns (identifiers first, each group by name),
    /// 2. the five bucket columns,
    /// 3. `latitude`, `longitude`, `time` when not placed yet,
    /// 4. everything else by name.
    ///
    /// Fails when no column maps to `time`. That column is stored as a
    /// timestamp whatever its declared type.
    pub fn build(table_name: &str, columns: &[Column]) -> Result<Self> {
        if !columns.iter().any(|c| c.normalized_name == "time") {
            return Err(Error::NoTimeColumn(table_name.to_string()));
        }
        // tabledap always serializes `time` as ISO-8601 text
        let columns: Vec<Column> = columns
            .iter()
            .cloned()
            .map(|mut c| {
                if c.normalized_name == "time" {
                    c.semantic_type = SemanticType::Timestamp;
                }
                c
            })
            .collect();

        let mut leading: Vec<&Column> = columns
            .iter()
            .filter(|c| c.is_identifier || c.semantic_type == SemanticType::Timestamp)
            .collect();
        leading.sort_by(|a, b| {
            b.is_identifier
                .cmp(&a.is_identifier)
                .then_with(|| a.normalized_name.cmp(&b.normalized_name))
        });

        let mut ordered: Vec<SchemaColumn> = leading
            .into_iter()
            .map(|c| SchemaColumn::Remote(c.clone()))
            .collect();
        ordered.extend(Period::ALL.into_iter().map(SchemaColumn::Bucket));

        for name in ["latitude", "longitude", "time"] {
            if ordered.iter().any(|c| c.name() == name) {
                continue;
            }
            if let Some(column) = columns.iter().find(|c| c.normalized_name == name) {
                ordered.push(SchemaColumn::Remote(column.clone()));
            }
        }

        let mut rest: Vec<&Column> = columns
            .iter()
            .filter(|c| !ordered.iter().any(|o| o.name() == c.normalized_name))
            .collect();
        rest.sort_by(|a, b| a.normalized_name.cmp(&b.normalized_name));
        ordered.extend(rest.into_iter().map(|c| SchemaColumn::Remote(c.clone())));

        let mut seen = BTreeSet::new();
        for column in &ordered {
            if !seen.insert(column.name()) {
                return Err(Error::Schema(format!(
                    "column name {} appears twice in {table_name}",
                    column.name()
                )));
            }
        }

        Ok(Self {
            table_name: table_name.to_string(),
            columns: ordered,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn columns(&self) -> &[SchemaColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&SchemaColumn> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Remote columns in schema order; this is the field order requested
    /// from the server.
    pub fn remote_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter_map(SchemaColumn::remote)
    }

    pub fn primary_keys(&self) -> Vec<&Column> {
        self.remote_columns().filter(|c| c.is_identifier).collect()
    }

    pub fn time_column(&self) -> Result<&Column> {
        self.remote_columns()
            .find(|c| c.normalized_name == "time")
            .ok_or_else(|| Error::NoTimeColumn(self.table_name.clone()))
    }

    pub fn create_table_sql(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(c.name()), c.sql_type()))
            .collect();
        format!(
            "CREATE TABLE {} ({})",
            quote_ident(&self.table_name),
            columns.join(", ")
        )
    }

    pub fn insert_sql(&self) -> String {
        let names: Vec<String> = self.columns.iter().map(|c| quote_ident(c.name())).collect();
        let placeholders = vec!["?"; self.columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            quote_ident(&self.table_name),
            names.join(", ")
        )
    }
}

/// Double-quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
