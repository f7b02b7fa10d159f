use crate::error::Result;
use crate::schema::{Schema, quote_ident};
use crate::stat::{StatAccumulator, register_reducer};
use diagnostics::*;
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use std::path::{Path, PathBuf};

/// One row of the local table, aligned with [`Schema::columns`].
pub type Row = Vec<Value>;

/// Destination of ingested rows.
pub trait BatchSink {
    fn begin(&mut self) -> Result<()>;
    fn write_batch(&mut self, rows: &[Row]) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn create_index(&mut self, columns: &[&str]) -> Result<()>;
}

/// Column names plus rows, as returned by a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Every value of one column.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }
}

/// Removes the database file when the store goes away.
struct StoreFile(PathBuf);

impl Drop for StoreFile {
    fn drop(&mut self) {
        if let Err(e) = remove_if_exists(&self.0) {
            let path = self.0.display().to_string();
            let error = e.to_string();
            warn!("Failed to remove local store {path}: {error}");
        }
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Ephemeral SQLite database holding one table for one aggregation run.
///
/// The `stdev` aggregate is registered on open. A file-backed store is
/// created fresh (any leftover file is removed) and deleted on drop.
pub struct LocalStore {
    conn: Connection,
    schema: Schema,
    insert_sql: String,
    file: Option<StoreFile>,
}

impl LocalStore {
    /// Create `{dir}/{table_name}.sqlite`.
    pub fn create(dir: &Path, schema: &Schema) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.sqlite", schema.table_name()));
        remove_if_exists(&path)?;
        let file = StoreFile(path.clone());

        let conn = Connection::open(&path)?;
        let display = path.display().to_string();
        debug!("Opened local store {display}");
        Self::init(conn, schema, Some(file))
    }

    pub fn in_memory(schema: &Schema) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, schema, None)
    }

    fn init(conn: Connection, schema: &Schema, file: Option<StoreFile>) -> Result<Self> {
        register_reducer::<StatAccumulator>(&conn, "stdev")?;
        conn.execute_batch(&schema.create_table_sql())?;
        Ok(Self {
            conn,
            schema: schema.clone(),
            insert_sql: schema.insert_sql(),
            file,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.0.as_path())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn row_count(&self) -> Result<usize> {
        let sql = format!("SELECT count(*) FROM {}", quote_ident(self.schema.table_name()));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub fn query(&self, sql: &str) -> Result<ResultSet> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })?
            .collect::<rusqlite::Result<Vec<Vec<Value>>>>()?;
        Ok(ResultSet { columns, rows })
    }
}

impl BatchSink for LocalStore {
    fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn write_batch(&mut self, rows: &[Row]) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(&self.insert_sql)?;
        for row in rows {
            stmt.execute(params_from_iter(row.iter()))?;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn create_index(&mut self, columns: &[&str]) -> Result<()> {
        let table = self.schema.table_name();
        let name = quote_ident(&format!("idx_{table}_{}", columns.join("_")));
        let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let sql = format!(
            "CREATE INDEX IF NOT EXISTS {name} ON {} ({})",
            quote_ident(table),
            quoted.join(", ")
        );
        self.conn.execute_batch(&sql)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erddap::{Column, SemanticType};

    fn schema() -> Schema {
        let mut station = Column::new("station", SemanticType::String);
        station.is_identifier = true;
        Schema::build(
            "buoys",
            &[
                station,
                Column::new("time", SemanticType::Timestamp),
                Column::new("temp", SemanticType::Double),
            ],
        )
        .unwrap()
    }

    fn row(station: &str, time: &str, day: &str, temp: Option<f64>) -> Row {
        let bucket = |s: &str| Value::Text(s.to_string());
        vec![
            bucket(station),
            bucket(time),
            bucket("m"),
            bucket("h"),
            bucket(day),
            bucket("w"),
            bucket("mo"),
            temp.map_or(Value::Null, Value::Real),
        ]
    }

    #[test]
    fn test_batches_and_query() {
        let mut store = LocalStore::in_memory(&schema()).unwrap();
        store.begin().unwrap();
        store
            .write_batch(&[
                row("A", "2016-01-01T00:00:00Z", "2016-01-01", Some(10.0)),
                row("A", "2016-01-01T12:00:00Z", "2016-01-01", Some(20.0)),
            ])
            .unwrap();
        store.create_index(&["station", "daily"]).unwrap();
        store.commit().unwrap();

        assert_eq!(store.row_count().unwrap(), 2);
        let result = store
            .query("SELECT \"station\", avg(\"temp\") \"mean\", stdev(\"temp\") \"sd\" FROM \"buoys\" GROUP BY 1")
            .unwrap();
        assert_eq!(result.columns, vec!["station", "mean", "sd"]);
        assert_eq!(result.rows[0][1], Value::Real(15.0));
        assert!(matches!(result.rows[0][2], Value::Real(sd) if (sd - 50f64.sqrt()).abs() < 1e-9));
        assert_eq!(result.column("station").unwrap(), vec![&Value::Text("A".into())]);
    }

    #[test]
    fn test_file_store_is_fresh_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buoys.sqlite");
        std::fs::write(&path, b"stale").unwrap();

        let store = LocalStore::create(dir.path(), &schema()).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        assert_eq!(store.row_count().unwrap(), 0);
        drop(store);
        assert!(!path.exists());
    }
}
