//! Restore script generation and replay
//!
//! Captured rows are turned into `INSERT OR REPLACE` statements keyed by `id`
//! and wrapped in a standalone shell script that feeds them to the `sqlite3`
//! shell. The same statements can be replayed in-process with [`apply`].
//!
//! Tables with a [`TableProfile`] get a fixed column list, and every column
//! missing from a captured row is filled with the profile's fallback. Other
//! tables are copied verbatim, column for column.
//!
//! Generation is deterministic. Fallbacks that depend on when or how often
//! the script runs (current time, fresh ids) are emitted as SQL expressions
//! evaluated by SQLite at restore time, never baked into the text.

use crate::db::Database;
use crate::error::{Error, Result};
use crate::snapshot::{CapturedTable, Row, Snapshot, TableSchema};
use crate::sql::{quote_ident, quote_text, shell_quote, value_literal};
use serde_json::Value;
use std::fmt::Write;

/// Restore-time timestamp, ISO-8601 local time with milliseconds
const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%f', 'now', 'localtime')";

/// Restore-time random identifier (32 hex chars)
const RANDOM_ID_SQL: &str = "lower(hex(randomblob(16)))";

const HEREDOC_DELIMITER: &str = "__RESTORE_SQL__";

/// Value written when a column is absent from a captured row
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fallback {
    Text(&'static str),
    Integer(i64),
    Real(f64),
    /// Current local timestamp at restore time
    Now,
    /// Fresh random identifier at restore time
    RandomId,
}

impl Fallback {
    /// SQL expression for this fallback
    pub fn sql(&self) -> String {
        match self {
            Fallback::Text(s) => quote_text(s),
            Fallback::Integer(i) => i.to_string(),
            Fallback::Real(f) => format!("{:?}", f),
            Fallback::Now => NOW_SQL.to_string(),
            Fallback::RandomId => RANDOM_ID_SQL.to_string(),
        }
    }
}

/// One column of a profiled table
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    /// Column declaration used when the destination table has to be created
    pub decl: &'static str,
    pub fallback: Fallback,
}

impl ColumnSpec {
    const fn new(name: &'static str, decl: &'static str, fallback: Fallback) -> Self {
        Self { name, decl, fallback }
    }
}

/// Column list and fallbacks for a known application table
#[derive(Debug)]
pub struct TableProfile {
    pub table: &'static str,
    pub columns: &'static [ColumnSpec],
}

pub static CATEGORIES: TableProfile = TableProfile {
    table: "categories",
    columns: &[
        ColumnSpec::new("id", "TEXT PRIMARY KEY", Fallback::RandomId),
        ColumnSpec::new("name", "TEXT NOT NULL", Fallback::Text("")),
        ColumnSpec::new("description", "TEXT", Fallback::Text("")),
        ColumnSpec::new("color", "TEXT", Fallback::Text("#FF6B6B")),
        ColumnSpec::new("icon", "TEXT", Fallback::Text("🍽️")),
        ColumnSpec::new("sort_order", "INTEGER NOT NULL DEFAULT 0", Fallback::Integer(0)),
        ColumnSpec::new("is_active", "INTEGER NOT NULL DEFAULT 1", Fallback::Integer(1)),
        ColumnSpec::new("created_at", "TEXT NOT NULL", Fallback::Now),
        ColumnSpec::new("updated_at", "TEXT NOT NULL", Fallback::Now),
    ],
};

pub static MENU_ITEMS: TableProfile = TableProfile {
    table: "menu_items",
    columns: &[
        ColumnSpec::new("id", "TEXT PRIMARY KEY", Fallback::RandomId),
        ColumnSpec::new("name", "TEXT NOT NULL", Fallback::Text("")),
        ColumnSpec::new("description", "TEXT", Fallback::Text("")),
        ColumnSpec::new("price", "REAL NOT NULL DEFAULT 0", Fallback::Real(0.0)),
        ColumnSpec::new("category_id", "TEXT", Fallback::Text("")),
        ColumnSpec::new("tags", "TEXT", Fallback::Text("[]")),
        ColumnSpec::new("custom_properties", "TEXT", Fallback::Text("{}")),
        ColumnSpec::new("variants", "TEXT", Fallback::Text("[]")),
        ColumnSpec::new("modifiers", "TEXT", Fallback::Text("[]")),
        ColumnSpec::new("nutritional_info", "TEXT", Fallback::Text("{}")),
        ColumnSpec::new("allergens", "TEXT", Fallback::Text("{}")),
        ColumnSpec::new("preparation_time", "INTEGER", Fallback::Integer(10)),
        ColumnSpec::new("is_vegetarian", "INTEGER", Fallback::Integer(0)),
        ColumnSpec::new("is_vegan", "INTEGER", Fallback::Integer(0)),
        ColumnSpec::new("is_gluten_free", "INTEGER", Fallback::Integer(0)),
        ColumnSpec::new("is_spicy", "INTEGER", Fallback::Integer(0)),
        ColumnSpec::new("spice_level", "INTEGER", Fallback::Integer(0)),
        ColumnSpec::new("stock_quantity", "INTEGER", Fallback::Integer(100)),
        ColumnSpec::new("low_stock_threshold", "INTEGER", Fallback::Integer(10)),
        ColumnSpec::new("created_at", "TEXT NOT NULL", Fallback::Now),
        ColumnSpec::new("updated_at", "TEXT NOT NULL", Fallback::Now),
    ],
};

/// Built-in profile for a table, if it has one
pub fn profile_for(table: &str) -> Option<&'static TableProfile> {
    [&CATEGORIES, &MENU_ITEMS]
        .into_iter()
        .find(|p| p.table == table)
}

impl TableProfile {
    /// `CREATE TABLE IF NOT EXISTS` for this profile
    pub fn create_sql(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(c.name), c.decl))
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            quote_ident(self.table),
            columns.join(", ")
        )
    }
}

/// One generated statement, labelled by the row it writes
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreStatement {
    pub key: String,
    pub sql: String,
}

/// Schema statement plus one insert per captured row, for one table
#[derive(Debug, Clone, PartialEq)]
pub struct TableSection {
    pub table: String,
    pub create_sql: String,
    pub statements: Vec<RestoreStatement>,
}

impl TableSection {
    /// Rows mapped onto a profile's columns, absent fields filled by fallback
    pub fn profiled(profile: &TableProfile, rows: &[Row]) -> Self {
        let column_list = profile
            .columns
            .iter()
            .map(|c| quote_ident(c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let statements = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let values: Vec<String> = profile
                    .columns
                    .iter()
                    .map(|c| match row.get(c.name) {
                        Some(value) => value_literal(value),
                        None => c.fallback.sql(),
                    })
                    .collect();
                RestoreStatement {
                    key: row_key(row, i, &["id"]),
                    sql: format!(
                        "INSERT OR REPLACE INTO {} ({}) VALUES ({});",
                        quote_ident(profile.table),
                        column_list,
                        values.join(", ")
                    ),
                }
            })
            .collect();

        Self {
            table: profile.table.to_string(),
            create_sql: profile.create_sql(),
            statements,
        }
    }

    /// Rows copied verbatim over the captured column list
    ///
    /// The table is recreated with its captured types, NOT NULL columns and
    /// primary key, so replaying the same rows replaces them instead of
    /// adding copies. A schema-less snapshot falls back to `id` as the key.
    pub fn generic(table: &str, columns: &[String], schema: &TableSchema, rows: &[Row]) -> Self {
        let typed = schema.types.len() == columns.len();
        let mut decls: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut decl = quote_ident(c);
                if typed && !schema.types[i].is_empty() {
                    decl.push(' ');
                    decl.push_str(&schema.types[i]);
                }
                if schema.not_null.contains(c) {
                    decl.push_str(" NOT NULL");
                }
                decl
            })
            .collect();

        let key: Vec<&str> = if !schema.primary_key.is_empty() {
            schema.primary_key.iter().map(String::as_str).collect()
        } else if schema.is_empty() && columns.iter().any(|c| c == "id") {
            vec!["id"]
        } else {
            Vec::new()
        };
        if !key.is_empty() {
            let key_list: Vec<String> = key.iter().map(|c| quote_ident(c)).collect();
            decls.push(format!("PRIMARY KEY ({})", key_list.join(", ")));
        }

        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            quote_ident(table),
            decls.join(", ")
        );

        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let statements = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let values: Vec<String> = columns
                    .iter()
                    .map(|c| row.get(c).map(value_literal).unwrap_or_else(|| "NULL".to_string()))
                    .collect();
                RestoreStatement {
                    key: row_key(row, i, &key),
                    sql: format!(
                        "INSERT OR REPLACE INTO {} ({}) VALUES ({});",
                        quote_ident(table),
                        column_list,
                        values.join(", ")
                    ),
                }
            })
            .collect();

        Self {
            table: table.to_string(),
            create_sql,
            statements,
        }
    }

    /// Section for a captured table, using its profile when asked and available
    pub fn for_table(table: &str, captured: &CapturedTable, use_profile: bool) -> Self {
        match profile_for(table).filter(|_| use_profile) {
            Some(profile) => Self::profiled(profile, &captured.data),
            None => Self::generic(table, &captured.columns, &captured.schema, &captured.data),
        }
    }
}

/// Label for a row in failure messages: its key values, or its position
fn row_key(row: &Row, index: usize, key: &[&str]) -> String {
    let parts: Option<Vec<String>> = key
        .iter()
        .map(|c| match row.get(*c) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
        .collect();
    match parts {
        Some(parts) if !parts.is_empty() => parts.join("/"),
        _ => format!("row {}", index + 1),
    }
}

/// A standalone restore script for one or more tables
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreScript {
    pub title: String,
    /// Destination database hard-coded into the script
    pub db_path: String,
    pub sections: Vec<TableSection>,
}

impl RestoreScript {
    pub fn new(title: impl Into<String>, db_path: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            db_path: db_path.into(),
            sections: Vec::new(),
        }
    }

    pub fn push(&mut self, section: TableSection) {
        self.sections.push(section);
    }

    /// Rows across all sections
    pub fn row_count(&self) -> usize {
        self.sections.iter().map(|s| s.statements.len()).sum()
    }

    /// The SQL program alone: schema then inserts, table by table
    pub fn sql(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            let _ = writeln!(
                out,
                "-- {} ({} rows)",
                section.table,
                section.statements.len()
            );
            let _ = writeln!(out, "{}", section.create_sql);
            for stmt in &section.statements {
                let _ = writeln!(out, "{}", stmt.sql);
            }
        }
        out
    }

    /// Full script text, with a `# Generated on:` line
    pub fn render(&self, generated_at: &str) -> String {
        self.render_inner(Some(generated_at))
    }

    /// Script text without the generation timestamp line
    ///
    /// Identical captured rows always give identical output here.
    pub fn render_body(&self) -> String {
        self.render_inner(None)
    }

    fn render_inner(&self, generated_at: Option<&str>) -> String {
        let sql = self.sql();
        let delimiter = heredoc_delimiter(&sql);
        let tables: Vec<&str> = self.sections.iter().map(|s| s.table.as_str()).collect();
        let rows = self.row_count();

        let mut out = String::new();
        let _ = writeln!(out, "#!/bin/sh");
        let _ = writeln!(out, "# {}", self.title);
        if let Some(ts) = generated_at {
            let _ = writeln!(out, "# Generated on: {}", ts);
        }
        let _ = writeln!(out, "#");
        let _ = writeln!(
            out,
            "# Replays {} captured row(s) into: {}",
            rows,
            tables.join(", ")
        );
        let _ = writeln!(out, "# Rows are written with INSERT OR REPLACE keyed by id.");
        let _ = writeln!(out, "# A failing row is reported by sqlite3 and skipped. Requires the sqlite3 shell.");
        let _ = writeln!(out);
        let _ = writeln!(out, "set -u");
        let _ = writeln!(out);
        let _ = writeln!(out, "DB_PATH={}", shell_quote(&self.db_path));
        let _ = writeln!(out);
        let _ = writeln!(out, "echo \"Restoring {} row(s) into $DB_PATH\"", rows);
        let _ = writeln!(out, "status=0");
        let _ = writeln!(out, "sqlite3 \"$DB_PATH\" <<'{}' || status=$?", delimiter);
        let _ = writeln!(out, ".bail off");
        out.push_str(&sql);
        let _ = writeln!(out, "{}", delimiter);
        let _ = writeln!(out, "if [ \"$status\" -ne 0 ]; then");
        let _ = writeln!(out, "    echo \"Restore finished with errors (see above)\" >&2");
        let _ = writeln!(out, "else");
        let _ = writeln!(out, "    echo \"Restore completed\"");
        let _ = writeln!(out, "fi");
        let _ = writeln!(out, "exit \"$status\"");
        out
    }
}

/// Pick a heredoc terminator that no line of the SQL program equals
fn heredoc_delimiter(sql: &str) -> String {
    let mut delimiter = HEREDOC_DELIMITER.to_string();
    while sql.lines().any(|line| line == delimiter) {
        delimiter.push('_');
    }
    delimiter
}

/// Script for a single table: its profile if it has one, otherwise a verbatim copy
///
/// Returns `None` when the table is absent from the snapshot or failed to read.
pub fn table_script(snapshot: &Snapshot, table: &str, db_path: &str) -> Option<RestoreScript> {
    let captured = snapshot.captured(table)?;
    let mut script = RestoreScript::new(format!("Restore script for table {}", table), db_path);
    script.push(TableSection::for_table(table, captured, true));
    Some(script)
}

/// Script copying every captured table verbatim
pub fn full_script(snapshot: &Snapshot, db_path: &str) -> RestoreScript {
    selected_script(snapshot, None, false, db_path)
}

/// Script for a subset of tables (all captured tables when `tables` is None)
///
/// Failed and unknown tables are skipped.
pub fn selected_script(
    snapshot: &Snapshot,
    tables: Option<&[String]>,
    use_profiles: bool,
    db_path: &str,
) -> RestoreScript {
    let mut script = RestoreScript::new("Comprehensive data restore script", db_path);
    for (name, entry) in snapshot.tables() {
        if let Some(wanted) = tables {
            if !wanted.iter().any(|t| t == name) {
                continue;
            }
        }
        match entry.as_captured() {
            Some(captured) => script.push(TableSection::for_table(name, captured, use_profiles)),
            None => tracing::warn!(table = name, "skipping table captured with an error"),
        }
    }
    script
}

/// Outcome of replaying a script in-process
#[derive(Debug, Default)]
pub struct RestoreOutcome {
    pub tables: usize,
    pub rows_written: usize,
    /// Per-record failures, in the order they happened
    pub failures: Vec<Error>,
}

/// Replay a script's statements against a database
///
/// Connectivity failures abort. Any other failure is recorded against its
/// row and the replay continues; nothing is rolled back.
pub fn apply(db: &Database, script: &RestoreScript) -> Result<RestoreOutcome> {
    let mut outcome = RestoreOutcome::default();

    for section in &script.sections {
        outcome.tables += 1;
        if let Err(e) = db.execute_batch(&section.create_sql) {
            if e.is_connectivity() {
                return Err(e);
            }
            tracing::warn!(table = %section.table, error = %e, "could not create table");
            outcome
                .failures
                .push(Error::record(&section.table, "<schema>", e));
        }

        for stmt in &section.statements {
            match db.execute(&stmt.sql) {
                Ok(_) => outcome.rows_written += 1,
                Err(e) if e.is_connectivity() => return Err(e),
                Err(e) => {
                    tracing::warn!(table = %section.table, key = %stmt.key, error = %e, "row not restored");
                    outcome
                        .failures
                        .push(Error::record(&section.table, &stmt.key, e));
                }
            }
        }
        tracing::info!(table = %section.table, rows = section.statements.len(), "table replayed");
    }

    Ok(outcome)
}
