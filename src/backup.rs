//! Backup pipeline: copy, extract, generate scripts, summarize
//!
//! A run produces one timestamped directory:
//!
//! ```text
//! tablet_backup_20250829_234119/
//! ├── README.md
//! ├── data/
//! │   ├── <database file>
//! │   └── extracted_data.json
//! └── scripts/
//!     ├── restore_categories.sh
//!     ├── restore_menu_items.sh
//!     └── restore_all_data.sh
//! ```

use crate::db::Database;
use crate::error::{Error, Result};
use crate::reader::read_snapshot;
use crate::report::{BackupSummary, ReadmeContext};
use crate::restore::{full_script, table_script};
use crate::snapshot::Snapshot;
use chrono::{DateTime, Local};
use colored::Colorize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const SNAPSHOT_FILE: &str = "extracted_data.json";
pub const FULL_SCRIPT_FILE: &str = "restore_all_data.sh";

/// Directory structure of one backup run
#[derive(Debug, Clone, PartialEq)]
pub struct BackupLayout {
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub scripts_dir: PathBuf,
}

impl BackupLayout {
    /// `<output_root>/tablet_backup_<YYYYmmdd_HHMMSS>`
    pub fn new(output_root: &Path, started: &DateTime<Local>) -> Self {
        let root = output_root.join(format!("tablet_backup_{}", started.format("%Y%m%d_%H%M%S")));
        Self {
            data_dir: root.join("data"),
            scripts_dir: root.join("scripts"),
            root,
        }
    }

    pub fn create(&self) -> Result<()> {
        for dir in [&self.root, &self.data_dir, &self.scripts_dir] {
            std::fs::create_dir_all(dir)?;
            println!("   {} {}", "Creating".green(), dir.display());
        }
        Ok(())
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }

    pub fn readme_path(&self) -> PathBuf {
        self.root.join("README.md")
    }
}

/// Inputs of a backup run
#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub source: PathBuf,
    pub output_root: PathBuf,
    /// Destination database path hard-coded into the scripts
    pub restore_db_path: String,
    /// Tables that get their own restore script
    pub script_tables: Vec<String>,
    pub started: DateTime<Local>,
}

/// What a backup run produced
#[derive(Debug)]
pub struct BackupReport {
    pub layout: BackupLayout,
    pub summary: BackupSummary,
    /// SHA-256 of the copied database file, lowercase hex
    pub checksum: String,
    /// Script file names under scripts/
    pub scripts: Vec<String>,
}

/// Run the whole pipeline
///
/// The database is copied first and the snapshot is read from the copy, so
/// the live file is only touched once.
pub fn run_backup(options: &BackupOptions) -> Result<BackupReport> {
    let source = &options.source;
    if !source.is_file() {
        return Err(Error::Connection(format!(
            "database not found: {}",
            source.display()
        )));
    }

    let layout = BackupLayout::new(&options.output_root, &options.started);
    layout.create()?;

    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "database.db".to_string());
    let copy_path = layout.data_dir.join(&file_name);
    std::fs::copy(source, &copy_path)?;
    println!("   {} data/{}", "Copying".green(), file_name);

    let checksum = file_sha256(&copy_path)?;
    tracing::info!(path = %copy_path.display(), sha256 = %checksum, "database copied");

    let db = Database::open_existing(&copy_path)?;
    let snapshot = read_snapshot(&db)?;
    drop(db);

    snapshot.write_to(&layout.snapshot_path())?;
    println!("   {} data/{}", "Creating".green(), SNAPSHOT_FILE);

    let generated_at = options.started.format("%Y-%m-%d %H:%M:%S").to_string();
    let scripts = write_scripts(
        &snapshot,
        &layout.scripts_dir,
        &options.restore_db_path,
        &options.script_tables,
        &generated_at,
    )?;

    let summary = BackupSummary::from_snapshot(&snapshot);
    let readme = summary.render_readme(&ReadmeContext {
        generated_at: &generated_at,
        source,
        checksum: Some(&checksum),
        backup_dir: &layout.root,
        database_copy: Some(&file_name),
        scripts: &scripts,
        restore_db_path: &options.restore_db_path,
    });
    std::fs::write(layout.readme_path(), readme)?;
    println!("   {} README.md", "Creating".green());

    Ok(BackupReport {
        layout,
        summary,
        checksum,
        scripts,
    })
}

/// Write one script per requested table plus the full-restore script
///
/// Tables missing from the snapshot or captured with an error get no
/// dedicated script. A table whose file name would clash with an earlier
/// one (or with the full-restore script) gets a numeric suffix. Returns the
/// file names written, in order.
pub fn write_scripts(
    snapshot: &Snapshot,
    scripts_dir: &Path,
    restore_db_path: &str,
    script_tables: &[String],
    generated_at: &str,
) -> Result<Vec<String>> {
    std::fs::create_dir_all(scripts_dir)?;
    let mut written = Vec::new();
    let mut taken: HashSet<String> = HashSet::from([FULL_SCRIPT_FILE.to_string()]);
    let mut scripted: HashSet<&str> = HashSet::new();

    for table in script_tables {
        if !scripted.insert(table.as_str()) {
            continue;
        }
        match table_script(snapshot, table, restore_db_path) {
            Some(script) => {
                let name = script_name(table, &mut taken);
                write_executable(&scripts_dir.join(&name), &script.render(generated_at))?;
                println!("   {} scripts/{} ({} rows)", "Creating".green(), name, script.row_count());
                written.push(name);
            }
            None => {
                println!("   {} restore script for {} (not captured)", "Skipping".yellow(), table);
            }
        }
    }

    let full = full_script(snapshot, restore_db_path);
    write_executable(&scripts_dir.join(FULL_SCRIPT_FILE), &full.render(generated_at))?;
    println!(
        "   {} scripts/{} ({} rows)",
        "Creating".green(),
        FULL_SCRIPT_FILE,
        full.row_count()
    );
    written.push(FULL_SCRIPT_FILE.to_string());

    Ok(written)
}

/// Lowercase hex SHA-256 of a file
pub fn file_sha256(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// `restore_<stem>.sh`, suffixed `_2`, `_3`, ... until unused
fn script_name(table: &str, taken: &mut HashSet<String>) -> String {
    let stem = format!("restore_{}", file_stem(table));
    let mut name = format!("{}.sh", stem);
    let mut n = 2;
    while taken.contains(&name) {
        name = format!("{}_{}.sh", stem, n);
        n += 1;
    }
    if n > 2 {
        tracing::warn!(table, script = %name, "script name already in use, renamed");
    }
    taken.insert(name.clone());
    name
}

/// Table name made safe for a file name
fn file_stem(table: &str) -> String {
    table
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

fn write_executable(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn started() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 8, 29, 23, 41, 19).unwrap()
    }

    fn sample_db(dir: &Path) -> PathBuf {
        let path = dir.join("pos.db");
        let db = Database::open_at(&path).unwrap();
        db.execute_batch(
            "CREATE TABLE categories (id TEXT PRIMARY KEY, name TEXT NOT NULL, sort_order INTEGER);
             INSERT INTO categories VALUES ('cat_1', 'Soups', 1), ('cat_2', 'Snacks', 2);
             CREATE TABLE orders (id TEXT PRIMARY KEY, total REAL);
             INSERT INTO orders VALUES ('o1', 12.5);",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_layout_name() {
        let layout = BackupLayout::new(Path::new("/backups"), &started());
        assert_eq!(layout.root, PathBuf::from("/backups/tablet_backup_20250829_234119"));
        assert_eq!(layout.scripts_dir, layout.root.join("scripts"));
        assert_eq!(layout.snapshot_path(), layout.root.join("data/extracted_data.json"));
    }

    #[test]
    fn test_run_backup_produces_full_layout() {
        let dir = TempDir::new().unwrap();
        let source = sample_db(dir.path());
        let out = dir.path().join("out");

        let report = run_backup(&BackupOptions {
            source: source.clone(),
            output_root: out,
            restore_db_path: "restored.db".to_string(),
            script_tables: vec!["categories".to_string(), "menu_items".to_string()],
            started: started(),
        })
        .unwrap();

        assert_eq!(report.summary.tables_processed, 2);
        assert_eq!(report.summary.total_rows, 3);
        // menu_items is absent, so it gets no dedicated script
        assert_eq!(report.scripts, vec!["restore_categories.sh", "restore_all_data.sh"]);
        assert_eq!(report.checksum, file_sha256(&source).unwrap());
        assert_eq!(report.checksum.len(), 64);

        let layout = &report.layout;
        assert!(layout.data_dir.join("pos.db").is_file());
        let snapshot = Snapshot::load(&layout.snapshot_path()).unwrap();
        assert_eq!(snapshot.captured("categories").unwrap().count, 2);

        let script = std::fs::read_to_string(layout.scripts_dir.join("restore_categories.sh")).unwrap();
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("# Generated on: 2025-08-29 23:41:19"));
        assert!(script.contains("DB_PATH='restored.db'"));

        let readme = std::fs::read_to_string(layout.readme_path()).unwrap();
        assert!(readme.contains(&report.checksum));
        assert!(readme.contains("- **orders**: 1 records"));
    }

    #[cfg(unix)]
    #[test]
    fn test_scripts_are_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let snapshot = Snapshot::new();
        let names = write_scripts(&snapshot, dir.path(), "pos.db", &[], "now").unwrap();
        assert_eq!(names, vec![FULL_SCRIPT_FILE]);
        let mode = std::fs::metadata(dir.path().join(FULL_SCRIPT_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_missing_source_is_connectivity_error() {
        let dir = TempDir::new().unwrap();
        let err = run_backup(&BackupOptions {
            source: dir.path().join("missing.db"),
            output_root: dir.path().to_path_buf(),
            restore_db_path: "pos.db".to_string(),
            script_tables: Vec::new(),
            started: started(),
        })
        .unwrap_err();
        assert!(err.is_connectivity());
        // Nothing is created before the source is known to exist
        assert!(!BackupLayout::new(dir.path(), &started()).root.exists());
    }

    #[test]
    fn test_colliding_script_names_are_suffixed() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(dir.path().join("pos.db")).unwrap();
        db.execute_batch(
            "CREATE TABLE all_data (id TEXT PRIMARY KEY);
             INSERT INTO all_data VALUES ('a1');
             CREATE TABLE \"odd/name\" (id TEXT PRIMARY KEY);
             INSERT INTO \"odd/name\" VALUES ('s1');
             CREATE TABLE odd_name (id TEXT PRIMARY KEY);
             INSERT INTO odd_name VALUES ('u1'), ('u2');",
        )
        .unwrap();
        let snapshot = read_snapshot(&db).unwrap();

        let scripts = dir.path().join("scripts");
        let tables: Vec<String> = ["all_data", "odd/name", "odd_name", "odd_name"]
            .iter()
            .map(|t| t.to_string())
            .collect();
        let names = write_scripts(&snapshot, &scripts, "pos.db", &tables, "now").unwrap();
        assert_eq!(
            names,
            vec![
                "restore_all_data_2.sh",
                "restore_odd_name.sh",
                "restore_odd_name_2.sh",
                FULL_SCRIPT_FILE,
            ]
        );

        // The full-restore script is not overwritten by the all_data table
        let full = std::fs::read_to_string(scripts.join(FULL_SCRIPT_FILE)).unwrap();
        assert!(full.contains("'u2'") && full.contains("'s1'"));
        let odd = std::fs::read_to_string(scripts.join("restore_odd_name.sh")).unwrap();
        assert!(odd.contains("'s1'") && !odd.contains("'u1'"));
        let underscored = std::fs::read_to_string(scripts.join("restore_odd_name_2.sh")).unwrap();
        assert!(underscored.contains("'u1'"));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("menu_items"), "menu_items");
        assert_eq!(file_stem("odd/name here"), "odd_name_here");
    }
}
