//! Snapshot document: every table of a database captured as JSON
//!
//! The on-disk shape is a single object keyed by table name:
//!
//! ```json
//! {
//!   "categories": {
//!     "columns": ["id", "name"],
//!     "schema": { "types": ["TEXT", "TEXT"], "not_null": ["name"], "primary_key": ["id"] },
//!     "data": [{"id": "cat_1", "name": "Soups"}],
//!     "count": 1
//!   },
//!   "broken":     { "error": "no such table: broken", "data": [], "count": 0 }
//! }
//! ```
//!
//! Table order and column order inside each row are preserved both ways.

use crate::error::{Error, Result};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// One captured row: column name -> value, in the table's column order
pub type Row = serde_json::Map<String, Value>;

/// Declared shape of a table, enough to recreate it with the same keys
///
/// `types` is parallel to the table's columns (an empty string for a column
/// declared without a type). `primary_key` lists the key columns in key
/// order. A snapshot written without this section loads with an empty
/// schema, and restores fall back to treating an `id` column as the key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_null: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// True when nothing about the declared shape was captured
    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.not_null.is_empty() && self.primary_key.is_empty()
    }
}

/// A table read in full
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSnapshot {
    pub name: String,
    pub columns: Vec<String>,
    pub schema: TableSchema,
    pub rows: Vec<Row>,
}

/// A successfully captured table as stored in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedTable {
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "TableSchema::is_empty")]
    pub schema: TableSchema,
    pub data: Vec<Row>,
    pub count: usize,
}

/// Placeholder for a table whose read failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTable {
    pub error: String,
    pub data: Vec<Row>,
    pub count: usize,
}

/// Entry for one table in the snapshot document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableEntry {
    Captured(CapturedTable),
    Failed(FailedTable),
}

impl TableEntry {
    /// Number of captured rows (0 for failed tables)
    pub fn count(&self) -> usize {
        match self {
            TableEntry::Captured(t) => t.count,
            TableEntry::Failed(_) => 0,
        }
    }

    /// Error message if the table could not be read
    pub fn error(&self) -> Option<&str> {
        match self {
            TableEntry::Captured(_) => None,
            TableEntry::Failed(f) => Some(&f.error),
        }
    }

    pub fn as_captured(&self) -> Option<&CapturedTable> {
        match self {
            TableEntry::Captured(t) => Some(t),
            TableEntry::Failed(_) => None,
        }
    }
}

impl From<TableSnapshot> for CapturedTable {
    fn from(table: TableSnapshot) -> Self {
        let count = table.rows.len();
        CapturedTable {
            columns: table.columns,
            schema: table.schema,
            data: table.rows,
            count,
        }
    }
}

/// Extraction manifest: table name -> captured table or error placeholder
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    tables: Vec<(String, TableEntry)>,
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.tables.iter().map(|(name, entry)| (name, entry)))
    }
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a table that was read successfully
    pub fn insert_captured(&mut self, table: TableSnapshot) {
        let name = table.name.clone();
        self.tables.push((name, TableEntry::Captured(table.into())));
    }

    /// Record a table whose read failed
    pub fn insert_failed(&mut self, name: &str, error: impl Into<String>) {
        let mut error = error.into();
        if error.is_empty() {
            error = "unknown error".to_string();
        }
        self.tables.push((
            name.to_string(),
            TableEntry::Failed(FailedTable {
                error,
                data: Vec::new(),
                count: 0,
            }),
        ));
    }

    pub fn get(&self, name: &str) -> Option<&TableEntry> {
        self.tables.iter().find(|(n, _)| n == name).map(|(_, e)| e)
    }

    /// Captured data for a table, if present and read without error
    pub fn captured(&self, name: &str) -> Option<&CapturedTable> {
        self.get(name).and_then(TableEntry::as_captured)
    }

    /// Tables in capture order
    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableEntry)> {
        self.tables.iter().map(|(n, e)| (n.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Serialize as pretty-printed JSON (two-space indent)
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a snapshot document
    pub fn from_json(content: &str) -> Result<Self> {
        let document: serde_json::Map<String, Value> = serde_json::from_str(content)
            .map_err(|e| Error::Malformed(format!("snapshot is not a JSON object: {}", e)))?;

        let mut tables = Vec::with_capacity(document.len());
        for (name, value) in document {
            let entry: TableEntry = serde_json::from_value(value)
                .map_err(|e| Error::Malformed(format!("table {}: {}", name, e)))?;
            validate_entry(&name, &entry)?;
            tables.push((name, entry));
        }
        Ok(Self { tables })
    }

    /// Write the document in one write call
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let content = self.to_json()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load a snapshot document from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Malformed(format!("could not read {}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }
}

fn validate_entry(name: &str, entry: &TableEntry) -> Result<()> {
    match entry {
        TableEntry::Captured(t) if t.count != t.data.len() => Err(Error::Malformed(format!(
            "table {}: count {} does not match {} data rows",
            name,
            t.count,
            t.data.len()
        ))),
        TableEntry::Captured(t) => validate_schema(name, &t.columns, &t.schema),
        TableEntry::Failed(f) if f.error.is_empty() || f.count != 0 || !f.data.is_empty() => {
            Err(Error::Malformed(format!(
                "table {}: error entries must carry a message and no data",
                name
            )))
        }
        TableEntry::Failed(_) => Ok(()),
    }
}

fn validate_schema(name: &str, columns: &[String], schema: &TableSchema) -> Result<()> {
    if !schema.types.is_empty() && schema.types.len() != columns.len() {
        return Err(Error::Malformed(format!(
            "table {}: {} column types for {} columns",
            name,
            schema.types.len(),
            columns.len()
        )));
    }
    if let Some(bad) = schema.types.iter().find(|t| !is_type_name(t)) {
        return Err(Error::Malformed(format!(
            "table {}: invalid column type {:?}",
            name, bad
        )));
    }
    let unknown = schema
        .not_null
        .iter()
        .chain(&schema.primary_key)
        .find(|c| !columns.contains(*c));
    match unknown {
        Some(column) => Err(Error::Malformed(format!(
            "table {}: schema names unknown column {}",
            name, column
        ))),
        None => Ok(()),
    }
}

/// Declared types are written into CREATE TABLE as-is
fn is_type_name(decl: &str) -> bool {
    !decl.contains("--")
        && decl
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || " _(),.+-".contains(c))
}
