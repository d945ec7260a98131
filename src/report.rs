//! Backup summary and README manifest, plus the menu listing of a snapshot

use crate::snapshot::{Snapshot, TableEntry};
use serde_json::Value;
use std::fmt::Write;
use std::path::Path;

/// How one table fared during extraction
#[derive(Debug, Clone, PartialEq)]
pub enum TableStatus {
    Captured { rows: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableOutcome {
    pub table: String,
    pub status: TableStatus,
}

/// Totals over a snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackupSummary {
    pub tables_processed: usize,
    pub tables_failed: usize,
    /// Rows across captured tables; failed tables count as zero
    pub total_rows: usize,
    pub outcomes: Vec<TableOutcome>,
}

impl BackupSummary {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut summary = BackupSummary::default();
        for (name, entry) in snapshot.tables() {
            summary.tables_processed += 1;
            let status = match entry {
                TableEntry::Captured(t) => {
                    summary.total_rows += t.count;
                    TableStatus::Captured { rows: t.count }
                }
                TableEntry::Failed(f) => {
                    summary.tables_failed += 1;
                    TableStatus::Failed {
                        error: f.error.clone(),
                    }
                }
            };
            summary.outcomes.push(TableOutcome {
                table: name.to_string(),
                status,
            });
        }
        summary
    }

    pub fn tables_captured(&self) -> usize {
        self.tables_processed - self.tables_failed
    }

    /// Render the backup directory's README.md
    pub fn render_readme(&self, ctx: &ReadmeContext<'_>) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Tablet Data Backup\n");
        let _ = writeln!(out, "**Generated on:** {}  ", ctx.generated_at);
        let _ = writeln!(out, "**Source database:** `{}`  ", ctx.source.display());
        if let Some(checksum) = ctx.checksum {
            let _ = writeln!(out, "**SHA-256:** `{}`", checksum);
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "## Backup Summary\n");
        let _ = writeln!(
            out,
            "{} tables processed, {} captured, {} failed, {} records in total.\n",
            self.tables_processed,
            self.tables_captured(),
            self.tables_failed,
            self.total_rows
        );
        for outcome in &self.outcomes {
            match &outcome.status {
                TableStatus::Captured { rows } => {
                    let _ = writeln!(out, "- **{}**: {} records", outcome.table, rows);
                }
                TableStatus::Failed { error } => {
                    let _ = writeln!(out, "- **{}**: error - {}", outcome.table, error);
                }
            }
        }

        let _ = writeln!(out, "\n## Files\n");
        let _ = writeln!(out, "- `data/extracted_data.json` - complete extracted data");
        if let Some(copy) = ctx.database_copy {
            let _ = writeln!(out, "- `data/{}` - copy of the source database", copy);
        }
        for script in ctx.scripts {
            let _ = writeln!(out, "- `scripts/{}`", script);
        }

        let _ = writeln!(out, "\n## Usage\n");
        let _ = writeln!(
            out,
            "Each script writes into the database path set in its `DB_PATH` line \
             (`{}`). Edit that line to target another file.\n",
            ctx.restore_db_path
        );
        for script in ctx.scripts {
            let _ = writeln!(out, "```bash\ncd {}/scripts\nsh {}\n```\n", ctx.backup_dir.display(), script);
        }

        let _ = writeln!(out, "## Notes\n");
        let _ = writeln!(out, "1. Back up the current database before running a restore script");
        let _ = writeln!(out, "2. Rows are written with INSERT OR REPLACE keyed by `id`; running a script twice gives the same rows");
        let _ = writeln!(out, "3. A row that fails (for example a constraint violation) is reported and skipped; nothing is rolled back");
        let _ = writeln!(out, "4. The scripts need the `sqlite3` command-line shell");
        out
    }
}

/// Facts about a backup run that the README mentions
#[derive(Debug, Clone)]
pub struct ReadmeContext<'a> {
    pub generated_at: &'a str,
    pub source: &'a Path,
    pub checksum: Option<&'a str>,
    pub backup_dir: &'a Path,
    /// File name of the database copy under data/
    pub database_copy: Option<&'a str>,
    /// File names under scripts/
    pub scripts: &'a [String],
    pub restore_db_path: &'a str,
}

/// Menu items and order volume found in a snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MenuListing {
    /// (name, price) in capture order
    pub items: Vec<(String, Value)>,
    pub categories: usize,
    pub orders: usize,
    pub order_items: usize,
}

impl MenuListing {
    /// Missing or failed tables count as empty
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let count = |table: &str| snapshot.get(table).map(TableEntry::count).unwrap_or(0);

        let items = snapshot
            .captured("menu_items")
            .map(|t| {
                t.data
                    .iter()
                    .map(|row| {
                        let name = match row.get("name") {
                            Some(Value::String(s)) => s.clone(),
                            Some(Value::Null) | None => "Unknown".to_string(),
                            Some(other) => other.to_string(),
                        };
                        let price = row.get("price").cloned().unwrap_or(Value::Null);
                        (name, price)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            items,
            categories: count("categories"),
            orders: count("orders"),
            order_items: count("order_items"),
        }
    }

    /// Plain-text listing, one item per line
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, (name, price)) in self.items.iter().enumerate() {
            let price = match price {
                Value::Number(n) => match n.as_f64() {
                    Some(p) => format!("${:.2}", p),
                    None => format!("${}", n),
                },
                Value::Null => "-".to_string(),
                Value::String(s) => format!("${}", s),
                other => other.to_string(),
            };
            let _ = writeln!(out, "  {:>3}. {} - {}", i + 1, name, price);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Total menu items: {}", self.items.len());
        let _ = writeln!(out, "Total categories: {}", self.categories);
        let _ = writeln!(out, "Total orders: {}", self.orders);
        let _ = writeln!(out, "Total order items: {}", self.order_items);
        out
    }
}
