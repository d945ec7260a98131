//! Row reader: walk every table of a row source into a snapshot
//!
//! A failure listing tables aborts the read. A failure reading one table is
//! recorded in the snapshot as an error entry and the remaining tables are
//! still read.

use crate::error::Result;
use crate::snapshot::{Row, Snapshot, TableSchema, TableSnapshot};

/// Columns, declared shape and rows of one table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRows {
    pub columns: Vec<String>,
    pub schema: TableSchema,
    pub rows: Vec<Row>,
}

/// Anything that can enumerate tables and hand back their rows
pub trait RowSource {
    /// User tables, in catalogue order
    fn table_names(&self) -> Result<Vec<String>>;

    /// Every row of a table with column names in native order
    fn read_table(&self, table: &str) -> Result<TableRows>;
}

/// Read every table of `source` into a snapshot
pub fn read_snapshot<S: RowSource + ?Sized>(source: &S) -> Result<Snapshot> {
    let tables = source.table_names()?;
    tracing::info!(tables = tables.len(), "reading tables");

    let mut snapshot = Snapshot::new();
    for table in tables {
        match source.read_table(&table) {
            Ok(TableRows {
                columns,
                schema,
                rows,
            }) => {
                tracing::debug!(table = %table, rows = rows.len(), "table captured");
                snapshot.insert_captured(TableSnapshot {
                    name: table,
                    columns,
                    schema,
                    rows,
                });
            }
            Err(e) => {
                tracing::warn!(table = %table, error = %e, "table read failed");
                snapshot.insert_failed(&table, e.to_string());
            }
        }
    }
    Ok(snapshot)
}
