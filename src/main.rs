use chrono::Local;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use pos_backup::backup::{self, BackupOptions};
use pos_backup::firestore::{FirestoreConfig, FirestoreStore, PROJECT_ENV};
use pos_backup::report::TableStatus;
use pos_backup::restore::{self, selected_script};
use pos_backup::seed::{default_categories, seed_categories};
use pos_backup::{
    prune_menu, read_snapshot, BackupSummary, Config, Database, Error, MenuListing, Result,
    Snapshot,
};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "pos-backup")]
#[command(author, version, about = "Back up, restore and maintain a restaurant POS tablet database")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite database file (default: [database].path from config)
    #[arg(long, global = true, env = "POS_BACKUP_DB_PATH")]
    db: Option<PathBuf>,

    /// Config file (default: .pos-backup/config.toml in this or a parent directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log progress (-v for info, -vv for debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy the database and write snapshot, restore scripts and README into a backup directory
    Extract {
        /// Directory the tablet_backup_<timestamp> folder is created in
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Database path written into the restore scripts
        #[arg(long)]
        restore_db_path: Option<String>,
    },

    /// Regenerate restore scripts from an existing snapshot file
    Generate {
        /// Snapshot file (extracted_data.json)
        snapshot: PathBuf,

        /// Directory the scripts are written to
        #[arg(short, long, default_value = "scripts")]
        output: PathBuf,

        /// Database path written into the restore scripts
        #[arg(long)]
        restore_db_path: Option<String>,
    },

    /// Replay a snapshot into the database, creating it if needed
    Restore {
        /// Snapshot file (extracted_data.json)
        snapshot: PathBuf,

        /// Only restore these tables (default: every captured table)
        #[arg(short, long = "table")]
        tables: Vec<String>,

        /// Fill absent columns of known tables with their defaults
        #[arg(long)]
        profiles: bool,
    },

    /// Insert the default menu categories
    Seed {
        /// Create the categories and menu_items tables when missing
        #[arg(long)]
        init_schema: bool,
    },

    /// List menu items and order counts
    Menu {
        /// Read from a snapshot file instead of the database
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Delete every remote category not on the keep-list, with its menu items
    Prune {
        /// Tenant whose menu is pruned
        #[arg(long)]
        tenant: String,

        /// Category names to keep (default: [remote].keep_categories from config)
        #[arg(long, num_args = 1..)]
        keep: Vec<String>,

        /// Actually delete; without this nothing is touched
        #[arg(long)]
        confirm: bool,

        /// Google Cloud project (default: config, then GOOGLE_CLOUD_PROJECT)
        #[arg(long)]
        project: Option<String>,
    },

    /// Generate shell completion script
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Command::Completion { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "pos-backup", &mut std::io::stdout());
        return;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => fail(&e),
    };
    let db_path = cli.db.clone().unwrap_or_else(|| config.database.path.clone());

    let result = match cli.command {
        Command::Extract {
            output,
            restore_db_path,
        } => cmd_extract(&config, &db_path, output, restore_db_path),
        Command::Generate {
            snapshot,
            output,
            restore_db_path,
        } => cmd_generate(&config, &snapshot, &output, restore_db_path),
        Command::Restore {
            snapshot,
            tables,
            profiles,
        } => cmd_restore(&db_path, &snapshot, &tables, profiles),
        Command::Seed { init_schema } => cmd_seed(&config, &db_path, init_schema),
        Command::Menu { snapshot } => cmd_menu(&db_path, snapshot.as_deref()),
        Command::Prune {
            tenant,
            keep,
            confirm,
            project,
        } => cmd_prune(&config, &tenant, keep, confirm, project),
        Command::Completion { .. } => Ok(()),
    };

    if let Err(e) = result {
        fail(&e);
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "pos_backup=warn",
        1 => "pos_backup=info",
        _ => "pos_backup=debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(e: &Error) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), e);
    std::process::exit(1);
}

fn cmd_extract(
    config: &Config,
    db_path: &Path,
    output: Option<PathBuf>,
    restore_db_path: Option<String>,
) -> Result<()> {
    let options = BackupOptions {
        source: db_path.to_path_buf(),
        output_root: output.unwrap_or_else(|| config.backup.output_dir.clone()),
        restore_db_path: restore_db_path.unwrap_or_else(|| config.backup.restore_db_path.clone()),
        script_tables: config.backup.script_tables.clone(),
        started: Local::now(),
    };

    println!("\n{}", "Backing up tablet data...".cyan().bold());
    println!("   Database: {}\n", db_path.display());

    let report = backup::run_backup(&options)?;
    print_summary(&report.summary);
    println!("\n{} {}", "Backup written to".green().bold(), report.layout.root.display());
    println!("   SHA-256: {}", report.checksum);
    Ok(())
}

fn cmd_generate(
    config: &Config,
    snapshot_path: &Path,
    output: &Path,
    restore_db_path: Option<String>,
) -> Result<()> {
    let snapshot = Snapshot::load(snapshot_path)?;
    let restore_db_path = restore_db_path.unwrap_or_else(|| config.backup.restore_db_path.clone());
    let generated_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

    let scripts = backup::write_scripts(
        &snapshot,
        output,
        &restore_db_path,
        &config.backup.script_tables,
        &generated_at,
    )?;
    println!(
        "\n{} {} script(s) in {}",
        "Generated".green().bold(),
        scripts.len(),
        output.display()
    );
    Ok(())
}

fn cmd_restore(db_path: &Path, snapshot_path: &Path, tables: &[String], profiles: bool) -> Result<()> {
    let snapshot = Snapshot::load(snapshot_path)?;
    let wanted = (!tables.is_empty()).then_some(tables);
    let script = selected_script(&snapshot, wanted, profiles, &db_path.to_string_lossy());

    let db = Database::open_at(db_path)?;
    println!("\n{}", "Restoring snapshot...".cyan().bold());
    println!("   Database: {}\n", db_path.display());

    let outcome = restore::apply(&db, &script)?;
    for failure in &outcome.failures {
        println!("   {} {}", "Failed".red(), failure);
    }
    println!(
        "\n{} {} row(s) into {} table(s), {} failed",
        "Restored".green().bold(),
        outcome.rows_written,
        outcome.tables,
        outcome.failures.len()
    );
    Ok(())
}

fn cmd_seed(config: &Config, db_path: &Path, init_schema: bool) -> Result<()> {
    let db = if init_schema {
        Database::open_at(db_path)?
    } else {
        Database::open_existing(db_path)?
    };
    let categories = config
        .seed
        .categories
        .clone()
        .unwrap_or_else(default_categories);
    let now = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string();

    println!("\n{}", "Seeding categories...".cyan().bold());
    let outcome = seed_categories(&db, &categories, init_schema, &now)?;
    for name in &outcome.added {
        println!("   {} {}", "Added".green(), name);
    }
    for name in &outcome.existing {
        println!("   {} {} (already exists)", "Skipping".yellow(), name);
    }
    for failure in &outcome.failed {
        println!("   {} {}", "Failed".red(), failure);
    }
    println!("\nTotal categories in database: {}", outcome.total);
    Ok(())
}

fn cmd_menu(db_path: &Path, snapshot_path: Option<&Path>) -> Result<()> {
    let snapshot = match snapshot_path {
        Some(path) => Snapshot::load(path)?,
        None => read_snapshot(&Database::open_existing(db_path)?)?,
    };
    let listing = MenuListing::from_snapshot(&snapshot);
    println!("\n{}", "Menu items".cyan().bold());
    print!("{}", listing.render());
    Ok(())
}

fn cmd_prune(
    config: &Config,
    tenant: &str,
    keep: Vec<String>,
    confirm: bool,
    project: Option<String>,
) -> Result<()> {
    let keep = if keep.is_empty() {
        config.remote.keep_categories.clone()
    } else {
        keep
    };

    if !confirm {
        eprintln!(
            "{} this deletes every category of tenant {} except: {}",
            "Warning:".yellow().bold(),
            tenant,
            keep.join(", ")
        );
        eprintln!("Re-run with --confirm to proceed. Nothing was changed.");
        std::process::exit(1);
    }

    let project = project
        .or_else(|| config.remote.project_id.clone())
        .or_else(|| std::env::var(PROJECT_ENV).ok().filter(|p| !p.is_empty()))
        .ok_or_else(|| {
            Error::Connection(format!(
                "no Firestore project: pass --project, set [remote].project_id or {}",
                PROJECT_ENV
            ))
        })?;

    let store = FirestoreStore::new(FirestoreConfig::from_env(project))?;
    println!("\n{}", "Pruning remote menu...".cyan().bold());
    println!("   Tenant: {}", tenant);
    println!("   Keeping: {}\n", keep.join(", "));

    let report = prune_menu(&store, tenant, &keep)?;
    println!(
        "   {} {} categories, {} items with them, {} orphaned items",
        "Deleted".green(),
        report.deleted_categories,
        report.deleted_items,
        report.deleted_orphans
    );
    for failure in &report.failures {
        println!("   {} {}", "Failed".red(), failure);
    }

    println!("\nRemaining categories:");
    for category in &report.remaining_categories {
        println!("   - {} ({})", category.name(), category.id);
    }
    println!("Remaining menu items: {}", report.remaining_items);
    Ok(())
}

fn print_summary(summary: &BackupSummary) {
    println!("\n{}", "Summary".cyan().bold());
    for outcome in &summary.outcomes {
        match &outcome.status {
            TableStatus::Captured { rows } => {
                println!("   {} {} ({} rows)", "Captured".green(), outcome.table, rows);
            }
            TableStatus::Failed { error } => {
                println!("   {} {}: {}", "Failed".red(), outcome.table, error);
            }
        }
    }
    println!(
        "\n   {} tables processed, {} failed, {} rows captured",
        summary.tables_processed, summary.tables_failed, summary.total_rows
    );
}
