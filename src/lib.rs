//! pos-backup - backup, restore and menu maintenance for a restaurant POS tablet
//!
//! The tablet keeps its state in a single SQLite file. This crate reads every
//! table of that file into a JSON snapshot, regenerates standalone restore
//! scripts from the snapshot, and summarizes what was captured. It also seeds
//! the default menu categories and prunes a tenant's menu in the remote
//! Firestore store.
//!
//! # Pipeline
//!
//! | Stage | Module |
//! |-------|--------|
//! | read every table | [`reader`], [`db`] |
//! | serialize | [`snapshot`] |
//! | restore scripts | [`restore`] |
//! | summary / README | [`report`] |
//! | all of the above into one directory | [`backup`] |
//!
//! # Quick Start
//!
//! ```no_run
//! use pos_backup::{read_snapshot, restore, Database};
//!
//! let db = Database::open_existing("pos.db").unwrap();
//! let snapshot = read_snapshot(&db).unwrap();
//!
//! let script = restore::full_script(&snapshot, "restored.db");
//! println!("{}", script.render("2025-08-29 23:41:19"));
//! ```

pub mod backup;
pub mod config;
pub mod db;
pub mod error;
pub mod firestore;
pub mod prune;
pub mod reader;
pub mod report;
pub mod restore;
pub mod schema;
pub mod seed;
pub mod snapshot;
pub mod sql;

pub use config::Config;
pub use db::{Category, Database, NewCategory};
pub use error::{Error, Result};
pub use prune::{prune_menu, DocumentStore, MemoryStore, PruneReport, RemoteDocument};
pub use reader::{read_snapshot, RowSource, TableRows};
pub use report::{BackupSummary, MenuListing};
pub use restore::{RestoreOutcome, RestoreScript, TableProfile};
pub use snapshot::{Row, Snapshot, TableEntry, TableSchema, TableSnapshot};
