//! HeartNotes command-line driver.
//!
//! # Responsibility
//! - Run entry and backup use cases against a local store from a shell.
//! - Keep the `ping` smoke probe for checking core linkage.
//!
//! # Invariants
//! - Destructive commands print a warning and exit unless `--yes` is given.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use heartnotes_core::codec::text::{escape_comment, format_observed_at, parse_observed_at};
use heartnotes_core::config::{BackupKind, StoreConfig, DB_PATH_ENV};
use heartnotes_core::repo::entry_repo::now_epoch_ms;
use heartnotes_core::service::backup_service::{
    export_database_to_dir, export_text_to_dir, list_backups, replace_database_from_path,
    restore_text_from_path, BackupError,
};
use heartnotes_core::{
    default_log_level, init_logging, Confirmation, DateZone, Entry, EntryFilter, EntryListQuery,
    EntryService, EntryStore, SortOrder,
};
use log::info;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "heartnotes",
    version,
    about = "Record count/total observations and manage HeartNotes backups"
)]
struct Cli {
    /// Path to the entry database
    #[arg(long, global = true, env = DB_PATH_ENV)]
    db: Option<PathBuf>,

    /// Directory for rolling log files; logging stays off when omitted
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print core linkage and version
    Ping,

    /// List entries
    #[command(alias = "ls")]
    List {
        /// none | nonzero | countEqualsTotal
        #[arg(short, long, default_value = "none")]
        filter: String,
        /// asc | desc
        #[arg(short, long, default_value = "desc")]
        sort: String,
    },

    /// Add a new entry
    Add {
        count: i64,
        total: i64,
        /// Comment text
        #[arg(short, long, default_value = "")]
        comment: String,
        /// Observation time as `Jan 01, 2024 08:00:00 -0600`; defaults to now
        #[arg(short, long)]
        at: Option<String>,
    },

    /// Edit an entry; omitted fields keep their current values
    Edit {
        id: i64,
        #[arg(long)]
        count: Option<i64>,
        #[arg(long)]
        total: Option<i64>,
        #[arg(short, long)]
        comment: Option<String>,
        #[arg(short, long)]
        at: Option<String>,
    },

    /// Delete an entry
    #[command(alias = "rm")]
    Delete { id: i64 },

    /// Write a text backup
    ExportText {
        /// Target directory; defaults to the database directory
        #[arg(short, long)]
        dir: Option<PathBuf>,
        #[arg(short, long, default_value = "none")]
        filter: String,
        #[arg(short, long, default_value = "desc")]
        sort: String,
    },

    /// Replace all entries with a text backup
    RestoreText {
        path: PathBuf,
        /// Confirm that every current entry will be deleted
        #[arg(short, long)]
        yes: bool,
    },

    /// Write a byte-exact database backup
    ExportDb {
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Replace all entries with the rows of another HeartNotes database
    ReplaceDb {
        path: PathBuf,
        #[arg(short, long)]
        yes: bool,
        /// Where the source is copied before merging
        #[arg(long)]
        staging_dir: Option<PathBuf>,
    },

    /// List backup files, newest first
    Backups {
        #[arg(short, long)]
        dir: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = KindArg::Text)]
        kind: KindArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Text,
    Db,
}

impl From<KindArg> for BackupKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Text => BackupKind::Text,
            KindArg::Db => BackupKind::Database,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    start_logging(cli.log_dir.as_deref(), cli.log_level.as_deref())?;

    let config = match &cli.db {
        Some(path) => StoreConfig::new(path),
        None => StoreConfig::from_env(),
    };
    let backup_home = config
        .db_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    match cli.command {
        Commands::Ping => {
            println!("heartnotes_core ping={}", heartnotes_core::ping());
            println!("heartnotes_core version={}", heartnotes_core::core_version());
        }
        Commands::List { filter, sort } => {
            let store = open_store(&config)?;
            let service = EntryService::new(store.repository()?);
            let entries = service.list_entries(&parse_query(&filter, &sort)?)?;
            if entries.is_empty() {
                println!("No entries.");
            }
            for entry in &entries {
                println!("{}", render_entry(entry));
            }
        }
        Commands::Add {
            count,
            total,
            comment,
            at,
        } => {
            let observed_at = match at {
                Some(text) => parse_time(&text)?,
                None => now_epoch_ms(),
            };
            let store = open_store(&config)?;
            let service = EntryService::new(store.repository()?);
            let id = service.record(observed_at, count, total, comment)?;
            println!("Created entry {id}");
        }
        Commands::Edit {
            id,
            count,
            total,
            comment,
            at,
        } => {
            let store = open_store(&config)?;
            let service = EntryService::new(store.repository()?);
            let current = service.get_entry(id)?;
            let observed_at = match at {
                Some(text) => parse_time(&text)?,
                None => current.observed_at,
            };
            service.revise(
                id,
                observed_at,
                count.unwrap_or(current.count),
                total.unwrap_or(current.total),
                comment.unwrap_or(current.comment),
            )?;
            println!("Updated entry {id}");
        }
        Commands::Delete { id } => {
            let store = open_store(&config)?;
            let service = EntryService::new(store.repository()?);
            if !service.delete_entry(id)? {
                bail!("no entry with id {id}");
            }
            println!("Deleted entry {id}");
        }
        Commands::ExportText { dir, filter, sort } => {
            let store = open_store(&config)?;
            let repo = store.repository()?;
            let dir = dir.unwrap_or(backup_home);
            let report = export_text_to_dir(
                &repo,
                &parse_query(&filter, &sort)?,
                &dir,
                DateZone::Local,
                &Local::now(),
            )?;
            if let Some(path) = &report.path {
                println!("Wrote {} entries to {}", report.entries_written, path.display());
            }
        }
        Commands::RestoreText { path, yes } => {
            if !yes {
                println!("WARNING: This will delete ALL current entries!");
                println!("To proceed, run again with --yes:");
                println!("  heartnotes restore-text {} --yes", path.display());
                return Ok(());
            }
            let store = open_store(&config)?;
            let repo = store.repository()?;
            match restore_text_from_path(&repo, &path, Confirmation::confirmed_by_user()) {
                Ok(report) => println!("{report}"),
                Err(BackupError::Restore {
                    rows_restored,
                    lines_read,
                    cause,
                }) => bail!(
                    "restore stopped at line {lines_read} after {rows_restored} entries: {cause}"
                ),
                Err(err) => return Err(err.into()),
            }
        }
        Commands::ExportDb { dir } => {
            let mut store = open_store(&config)?;
            let dir = dir.unwrap_or(backup_home);
            let path = export_database_to_dir(&mut store, &dir, &Local::now())?;
            println!("Database saved to {}", path.display());
        }
        Commands::ReplaceDb {
            path,
            yes,
            staging_dir,
        } => {
            if !yes {
                println!("WARNING: This will replace ALL current entries!");
                println!("To proceed, run again with --yes:");
                println!("  heartnotes replace-db {} --yes", path.display());
                return Ok(());
            }
            let store = open_store(&config)?;
            let staging = staging_dir.unwrap_or_else(|| backup_home.join("staging"));
            let report = replace_database_from_path(
                &store,
                &path,
                &staging,
                Confirmation::confirmed_by_user(),
            )
            .with_context(|| {
                format!(
                    "replace from {} failed; the entry table may now be empty",
                    path.display()
                )
            })?;
            println!("Replaced with {} entries", report.rows_copied);
        }
        Commands::Backups { dir, kind } => {
            let dir = dir.unwrap_or(backup_home);
            let backups = list_backups(&dir, kind.into())?;
            if backups.is_empty() {
                println!("No backups found in {}", dir.display());
            }
            for backup in &backups {
                println!("{}", backup.path.display());
            }
        }
    }

    Ok(())
}

fn start_logging(log_dir: Option<&Path>, level: Option<&str>) -> Result<()> {
    let Some(log_dir) = log_dir else {
        return Ok(());
    };
    let log_dir = if log_dir.is_absolute() {
        log_dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(log_dir)
    };
    let level = level.unwrap_or(default_log_level().as_str());
    let log_dir = log_dir
        .to_str()
        .ok_or_else(|| anyhow!("log directory is not valid UTF-8"))?;
    init_logging(level, log_dir)?;
    info!("event=cli_start module=cli status=ok");
    Ok(())
}

fn open_store(config: &StoreConfig) -> Result<EntryStore> {
    EntryStore::open(config.clone())
        .with_context(|| format!("failed to open {}", config.db_path.display()))
}

fn parse_query(filter: &str, sort: &str) -> Result<EntryListQuery> {
    let filter = EntryFilter::from_name(filter)
        .ok_or_else(|| anyhow!("unknown filter `{filter}`; expected none|nonzero|countEqualsTotal"))?;
    let sort =
        SortOrder::from_name(sort).ok_or_else(|| anyhow!("unknown sort `{sort}`; expected asc|desc"))?;
    Ok(EntryListQuery::new(filter, sort))
}

fn parse_time(text: &str) -> Result<i64> {
    parse_observed_at(text)
        .ok_or_else(|| anyhow!("cannot parse `{text}`; expected e.g. `Jan 01, 2024 08:00:00 -0600`"))
}

fn render_entry(entry: &Entry) -> String {
    let date = format_observed_at(entry.observed_at, DateZone::Local)
        .unwrap_or_else(|| entry.observed_at.to_string());
    let marker = if entry.edited { "*" } else { " " };
    format!(
        "{:>6}{} {:>4}/{:<4} {}  {}",
        entry.id,
        marker,
        entry.count,
        entry.total,
        date,
        escape_comment(&entry.comment)
    )
}
