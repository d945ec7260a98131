//! SQLite database access with Diesel
//!
//! Two kinds of access live here: catalogue-driven raw SQL for reading any
//! table of a tablet database into JSON rows, and typed Diesel writes for the
//! application's `categories` table.

use crate::error::{Error, Result};
use crate::reader::{RowSource, TableRows};
use crate::schema::categories;
use crate::snapshot::{Row, TableSchema};
use crate::sql::{quote_ident, quote_text};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Columns per nested json_array() call; SQLite caps function arguments at 127
const COLUMN_CHUNK: usize = 100;

// ============================================================================
// Diesel Models
// ============================================================================

/// Insertable category
#[derive(Insertable)]
#[diesel(table_name = categories)]
pub struct NewCategory<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub color: Option<&'a str>,
    pub icon: Option<&'a str>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Queryable category
#[derive(Queryable, Selectable, Debug, Clone, serde::Serialize)]
#[diesel(table_name = categories)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

// ============================================================================
// Helper structs for raw SQL queries
// ============================================================================

/// Helper for sqlite_master table queries
#[derive(QueryableByName, Debug)]
struct TableInfo {
    #[diesel(sql_type = diesel::sql_types::Text)]
    name: String,
}

/// Helper for pragma_table_info queries
#[derive(QueryableByName, Debug)]
struct PragmaTableInfo {
    #[diesel(sql_type = diesel::sql_types::Text)]
    name: String,
    #[diesel(sql_type = diesel::sql_types::Text)]
    decl_type: String,
    #[diesel(sql_type = diesel::sql_types::Integer)]
    not_null: i32,
    /// 1-based position in the primary key, 0 for non-key columns
    #[diesel(sql_type = diesel::sql_types::Integer)]
    pk: i32,
}

/// One row rendered by SQLite as nested JSON arrays of column values
#[derive(QueryableByName, Debug)]
struct RowValues {
    #[diesel(sql_type = diesel::sql_types::Text)]
    row_values: String,
}

#[derive(QueryableByName, Debug)]
struct RowCount {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    n: i64,
}

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Database connection wrapper
///
/// The pool holds a single connection; every command is sequential.
pub struct Database {
    pool: DbPool,
    path: PathBuf,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Open a database file that must already exist
    ///
    /// SQLite would silently create an empty file, which would then snapshot
    /// as "no tables" instead of failing.
    pub fn open_existing<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::Connection(format!(
                "database not found: {}",
                path.display()
            )));
        }
        Self::connect(path)
    }

    /// Open a database at the given path, creating the file (and its parent
    /// directory) if needed
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::connect(path)
    }

    fn connect(path: &Path) -> Result<Self> {
        let path_str = path.to_string_lossy().to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(&path_str);
        let pool = Pool::builder()
            .max_size(1)
            .connection_timeout(Duration::from_secs(5))
            .build(manager)
            .map_err(|e| Error::Connection(format!("{}: {}", path.display(), e)))?;

        tracing::debug!(path = %path.display(), "database opened");
        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    fn get_conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| Error::Connection(e.to_string()))
    }

    // ========================================================================
    // Catalogue
    // ========================================================================

    /// List user tables in catalogue order, skipping SQLite's internal tables
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let mut conn = self.get_conn()?;
        let tables: Vec<TableInfo> = diesel::sql_query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'",
        )
        .load(&mut conn)?;
        Ok(tables.into_iter().map(|t| t.name).collect())
    }

    /// Whether a table exists
    pub fn has_table(&self, table: &str) -> Result<bool> {
        let mut conn = self.get_conn()?;
        let tables: Vec<TableInfo> = diesel::sql_query(format!(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = {}",
            quote_text(table)
        ))
        .load(&mut conn)?;
        Ok(!tables.is_empty())
    }

    fn column_info(&self, table: &str) -> Result<Vec<PragmaTableInfo>> {
        let mut conn = self.get_conn()?;
        let columns = diesel::sql_query(format!(
            "SELECT name, type AS decl_type, \"notnull\" AS not_null, pk FROM pragma_table_info({}) ORDER BY cid",
            quote_text(table)
        ))
        .load(&mut conn)?;
        Ok(columns)
    }

    /// Declared types, NOT NULL columns and primary key of a table
    pub fn table_schema(&self, table: &str) -> Result<TableSchema> {
        Ok(schema_of(&self.column_info(table)?))
    }

    /// Read every row of a table
    ///
    /// SQLite renders each row as JSON so values keep their storage class
    /// (integer, real, text, null). BLOBs have no JSON form and are read as
    /// their hex string.
    pub fn read_rows(&self, table: &str) -> Result<TableRows> {
        let info = self.column_info(table)?;
        if info.is_empty() {
            return Err(Error::MissingTable(table.to_string()));
        }
        let schema = schema_of(&info);
        let columns: Vec<String> = info.into_iter().map(|c| c.name).collect();

        let mut conn = self.get_conn()?;
        let raw: Vec<RowValues> = diesel::sql_query(row_values_sql(table, &columns)).load(&mut conn)?;

        let mut rows = Vec::with_capacity(raw.len());
        for r in raw {
            let chunks: Vec<Vec<Value>> = serde_json::from_str(&r.row_values)?;
            let values: Vec<Value> = chunks.into_iter().flatten().collect();
            if values.len() != columns.len() {
                return Err(Error::Malformed(format!(
                    "{}: row has {} values for {} columns",
                    table,
                    values.len(),
                    columns.len()
                )));
            }
            let row: Row = columns.iter().cloned().zip(values).collect();
            rows.push(row);
        }

        Ok(TableRows {
            columns,
            schema,
            rows,
        })
    }

    /// Number of rows in a table
    pub fn count_rows(&self, table: &str) -> Result<i64> {
        let mut conn = self.get_conn()?;
        let count: RowCount =
            diesel::sql_query(format!("SELECT COUNT(*) AS n FROM {}", quote_ident(table)))
                .get_result(&mut conn)?;
        Ok(count.n)
    }

    // ========================================================================
    // Raw statements
    // ========================================================================

    /// Run one SQL statement, returning the number of affected rows
    pub fn execute(&self, sql: &str) -> Result<usize> {
        let mut conn = self.get_conn()?;
        Ok(diesel::sql_query(sql).execute(&mut conn)?)
    }

    /// Run several `;`-separated SQL statements
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let mut conn = self.get_conn()?;
        conn.batch_execute(sql)?;
        Ok(())
    }

    // ========================================================================
    // Category Operations
    // ========================================================================

    /// Insert a category; fails on an existing id
    pub fn insert_category(&self, category: &NewCategory<'_>) -> Result<()> {
        let mut conn = self.get_conn()?;
        diesel::insert_into(categories::table)
            .values(category)
            .execute(&mut conn)?;
        Ok(())
    }

    /// All categories in display order
    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let mut conn = self.get_conn()?;
        let rows = categories::table
            .select(Category::as_select())
            .order((categories::sort_order.asc(), categories::name.asc()))
            .load(&mut conn)?;
        Ok(rows)
    }

    pub fn count_categories(&self) -> Result<i64> {
        let mut conn = self.get_conn()?;
        Ok(categories::table.count().get_result(&mut conn)?)
    }
}

impl RowSource for Database {
    fn table_names(&self) -> Result<Vec<String>> {
        self.list_tables()
    }

    fn read_table(&self, table: &str) -> Result<TableRows> {
        self.read_rows(table)
    }
}

fn schema_of(info: &[PragmaTableInfo]) -> TableSchema {
    let mut key: Vec<&PragmaTableInfo> = info.iter().filter(|c| c.pk > 0).collect();
    key.sort_by_key(|c| c.pk);
    TableSchema {
        types: info.iter().map(|c| c.decl_type.clone()).collect(),
        not_null: info
            .iter()
            .filter(|c| c.not_null != 0)
            .map(|c| c.name.clone())
            .collect(),
        primary_key: key.into_iter().map(|c| c.name.clone()).collect(),
    }
}

/// Build `SELECT json_array(json_array(c1, ..), json_array(..)) AS row_values FROM t`
fn row_values_sql(table: &str, columns: &[String]) -> String {
    let chunks: Vec<String> = columns
        .chunks(COLUMN_CHUNK)
        .map(|chunk| {
            let args: Vec<String> = chunk
                .iter()
                .map(|c| {
                    let col = quote_ident(c);
                    format!("CASE WHEN typeof({col}) = 'blob' THEN hex({col}) ELSE {col} END")
                })
                .collect();
            format!("json_array({})", args.join(", "))
        })
        .collect();

    format!(
        "SELECT json_array({}) AS row_values FROM {}",
        chunks.join(", "),
        quote_ident(table)
    )
}
