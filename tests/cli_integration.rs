//! Integration tests for the pos-backup CLI
//!
//! These tests drive the built binary against scratch databases in a
//! temporary directory. Nothing is mocked, and no test talks to the network.

use pos_backup::{read_snapshot, Database, Snapshot};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Run pos-backup inside `dir` with the database path taken from the environment
fn run_pos_backup(args: &[&str], dir: &Path, db_path: &Path) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_pos-backup"))
        .args(args)
        .current_dir(dir)
        .env("POS_BACKUP_DB_PATH", db_path)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute pos-backup")
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// A tablet database with two categories, two menu items and one order
fn tablet_db(dir: &Path) -> PathBuf {
    let path = dir.join("tablet.db");
    let db = Database::open_at(&path).unwrap();
    db.execute_batch(
        "CREATE TABLE categories (id TEXT PRIMARY KEY, name TEXT NOT NULL, sort_order INTEGER);
         INSERT INTO categories VALUES ('cat_soups', 'SOUPS', 1), ('cat_snacks', 'SNACKS', 10);
         CREATE TABLE menu_items (id TEXT PRIMARY KEY, name TEXT NOT NULL, price REAL, category_id TEXT);
         INSERT INTO menu_items VALUES ('m1', 'Manchow Soup', 6.5, 'cat_soups'), ('m2', 'Samosa', 4.0, 'cat_snacks');
         CREATE TABLE orders (id TEXT PRIMARY KEY, total REAL);
         INSERT INTO orders VALUES ('o1', 10.5);",
    )
    .unwrap();
    path
}

fn write_snapshot(dir: &Path) -> PathBuf {
    let db = Database::open_existing(tablet_db(dir)).unwrap();
    let path = dir.join("extracted_data.json");
    read_snapshot(&db).unwrap().write_to(&path).unwrap();
    path
}

// =============================================================================
// Basic Command Tests
// =============================================================================

#[test]
fn test_help_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_pos-backup"))
        .arg("--help")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("pos-backup"));
    assert!(out.contains("extract"));
    assert!(out.contains("prune"));
}

#[test]
fn test_version_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_pos-backup"))
        .arg("--version")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    assert!(stdout(&output).contains("pos-backup"));
}

#[test]
fn test_completion_zsh() {
    let output = Command::new(env!("CARGO_BIN_EXE_pos-backup"))
        .args(["completion", "zsh"])
        .output()
        .expect("Failed to execute");

    assert!(output.status.success(), "completion zsh failed: {}", stderr(&output));
    assert!(stdout(&output).contains("#compdef pos-backup"));
}

// =============================================================================
// Backup Pipeline
// =============================================================================

#[test]
fn test_extract_writes_backup_directory() {
    let dir = TempDir::new().unwrap();
    let db_path = tablet_db(dir.path());
    let out = dir.path().join("backups");

    let output = run_pos_backup(
        &["extract", "--output", out.to_str().unwrap()],
        dir.path(),
        &db_path,
    );
    assert!(output.status.success(), "extract failed: {}", stderr(&output));
    assert!(stdout(&output).contains("3 tables processed, 0 failed, 5 rows captured"));

    let backups: Vec<PathBuf> = std::fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(backups.len(), 1);
    let root = &backups[0];
    assert!(root
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("tablet_backup_"));

    assert!(root.join("data/tablet.db").is_file());
    assert!(root.join("README.md").is_file());
    assert!(root.join("scripts/restore_categories.sh").is_file());
    assert!(root.join("scripts/restore_menu_items.sh").is_file());
    assert!(root.join("scripts/restore_all_data.sh").is_file());
    assert!(!root.join("scripts/restore_orders.sh").exists());

    let snapshot = Snapshot::load(&root.join("data/extracted_data.json")).unwrap();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot.captured("menu_items").unwrap().count, 2);
}

#[test]
fn test_extract_missing_database_fails() {
    let dir = TempDir::new().unwrap();
    let output = run_pos_backup(&["extract"], dir.path(), &dir.path().join("nope.db"));

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("database not found"));
    assert!(!dir.path().join("nope.db").exists());
}

#[test]
fn test_generate_scripts_from_snapshot() {
    let dir = TempDir::new().unwrap();
    let snapshot = write_snapshot(dir.path());
    let scripts = dir.path().join("scripts");

    let output = run_pos_backup(
        &[
            "generate",
            snapshot.to_str().unwrap(),
            "--output",
            scripts.to_str().unwrap(),
            "--restore-db-path",
            "/data/pos.db",
        ],
        dir.path(),
        &dir.path().join("unused.db"),
    );
    assert!(output.status.success(), "generate failed: {}", stderr(&output));

    let script = std::fs::read_to_string(scripts.join("restore_categories.sh")).unwrap();
    assert!(script.contains("DB_PATH='/data/pos.db'"));
    assert!(script.contains("INSERT OR REPLACE INTO \"categories\""));
    assert!(scripts.join("restore_all_data.sh").is_file());
}

#[test]
fn test_restore_snapshot_into_new_database() {
    let dir = TempDir::new().unwrap();
    let snapshot = write_snapshot(dir.path());
    let target = dir.path().join("restored").join("pos.db");

    let output = run_pos_backup(
        &["restore", snapshot.to_str().unwrap(), "--table", "menu_items"],
        dir.path(),
        &target,
    );
    assert!(output.status.success(), "restore failed: {}", stderr(&output));
    assert!(stdout(&output).contains("2 row(s) into 1 table(s), 0 failed"));

    let db = Database::open_existing(&target).unwrap();
    assert_eq!(db.list_tables().unwrap(), vec!["menu_items"]);
    assert_eq!(db.count_rows("menu_items").unwrap(), 2);
}

fn sqlite3_available() -> bool {
    Command::new("sqlite3")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run a generated script with sh from its own directory
fn run_script(scripts: &Path, name: &str) -> std::process::Output {
    Command::new("sh")
        .arg(name)
        .current_dir(scripts)
        .output()
        .expect("Failed to execute sh")
}

fn generate_scripts(dir: &Path, snapshot: &Path, scripts: &Path, target: &Path) {
    let output = run_pos_backup(
        &[
            "generate",
            snapshot.to_str().unwrap(),
            "--output",
            scripts.to_str().unwrap(),
            "--restore-db-path",
            target.to_str().unwrap(),
        ],
        dir,
        &dir.join("unused.db"),
    );
    assert!(output.status.success(), "generate failed: {}", stderr(&output));
}

#[test]
fn test_generated_scripts_run_under_sqlite3() {
    if !sqlite3_available() {
        eprintln!("sqlite3 not found on PATH, skipping");
        return;
    }
    let dir = TempDir::new().unwrap();
    let source = Database::open_existing(tablet_db(dir.path())).unwrap();
    source
        .execute_batch(
            "CREATE TABLE order_items (order_id TEXT, item_id TEXT, qty INTEGER NOT NULL, PRIMARY KEY (order_id, item_id));
             INSERT INTO order_items VALUES ('o1', 'm1', 1), ('o1', 'm2', 2);
             CREATE TABLE settings (key TEXT PRIMARY KEY, value TEXT);
             INSERT INTO settings VALUES ('currency', 'CAD');",
        )
        .unwrap();
    let original = read_snapshot(&source).unwrap();
    let snapshot = dir.path().join("extracted_data.json");
    original.write_to(&snapshot).unwrap();

    // Full restore, twice: the second run replaces rows instead of adding them
    let scripts = dir.path().join("scripts");
    let target = dir.path().join("restored.db");
    generate_scripts(dir.path(), &snapshot, &scripts, &target);
    for _ in 0..2 {
        let output = run_script(&scripts, "restore_all_data.sh");
        assert!(output.status.success(), "script failed: {}", stderr(&output));
        assert!(stdout(&output).contains("Restore completed"));
    }

    let restored = read_snapshot(&Database::open_existing(&target).unwrap()).unwrap();
    assert_eq!(restored.len(), original.len());
    for (name, entry) in original.tables() {
        assert_eq!(entry.as_captured(), restored.captured(name), "table {}", name);
    }

    // A single-table script fills the columns the tablet did not have
    let scripts = dir.path().join("categories_only");
    let target = dir.path().join("categories.db");
    generate_scripts(dir.path(), &snapshot, &scripts, &target);
    let output = run_script(&scripts, "restore_categories.sh");
    assert!(output.status.success(), "script failed: {}", stderr(&output));

    let db = Database::open_existing(&target).unwrap();
    assert_eq!(db.list_tables().unwrap(), vec!["categories"]);
    let categories = db.list_categories().unwrap();
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[0].name, "SOUPS");
    assert_eq!(categories[0].color.as_deref(), Some("#FF6B6B"));
    assert!(categories[0].is_active);
}

// =============================================================================
// Categories and Menu
// =============================================================================

#[test]
fn test_seed_twice() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("fresh.db");

    let first = run_pos_backup(&["seed", "--init-schema"], dir.path(), &db_path);
    assert!(first.status.success(), "seed failed: {}", stderr(&first));
    assert!(stdout(&first).contains("Total categories in database: 10"));

    let second = run_pos_backup(&["seed"], dir.path(), &db_path);
    assert!(second.status.success());
    let out = stdout(&second);
    assert!(out.contains("SOUPS (already exists)"));
    assert!(out.contains("Total categories in database: 10"));
}

#[test]
fn test_seed_without_table_fails() {
    let dir = TempDir::new().unwrap();
    let db_path = tablet_db(dir.path());
    Database::open_existing(&db_path)
        .unwrap()
        .execute_batch("DROP TABLE categories;")
        .unwrap();

    let output = run_pos_backup(&["seed"], dir.path(), &db_path);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("table not found: categories"));
}

#[test]
fn test_menu_listing() {
    let dir = TempDir::new().unwrap();
    let db_path = tablet_db(dir.path());

    let output = run_pos_backup(&["menu"], dir.path(), &db_path);
    assert!(output.status.success(), "menu failed: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Manchow Soup - $6.50"));
    assert!(out.contains("Total menu items: 2"));
    assert!(out.contains("Total orders: 1"));
    assert!(out.contains("Total order items: 0"));
}

// =============================================================================
// Remote Pruning
// =============================================================================

#[test]
fn test_prune_requires_confirm() {
    let dir = TempDir::new().unwrap();
    let output = run_pos_backup(
        &["prune", "--tenant", "ohbombay", "--keep", "Snacks"],
        dir.path(),
        &dir.path().join("unused.db"),
    );

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("--confirm"));
    assert!(err.contains("except: Snacks"));
}

#[test]
fn test_prune_default_keep_list() {
    let dir = TempDir::new().unwrap();
    let output = run_pos_backup(
        &["prune", "--tenant", "ohbombay"],
        dir.path(),
        &dir.path().join("unused.db"),
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("except: Snacks, Receipts"));
}
