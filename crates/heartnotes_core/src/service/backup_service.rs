//! Backup/restore orchestration.
//!
//! # Responsibility
//! - Sequence text export, text restore, database export and database
//!   replace against one entry store.
//! - Report how far a failed restore got so callers can tell users what was
//!   salvaged.
//!
//! # Invariants
//! - Exports never write to the store.
//! - Destructive operations require a `Confirmation`; this module never
//!   prompts on its own.
//! - Text restore stops at the first malformed line or failed create.
//!   Rows created before the failure stay; nothing is rolled back.
//! - Every restored row is flagged edited and stamped with the restore
//!   start time.
//! - A replace that fails after the table was cleared leaves it empty.

use crate::codec::text::{DateZone, ParseError, TextReader, TextWriter};
use crate::config::BackupKind;
use crate::repo::entry_repo::{now_epoch_ms, EntryListQuery, EntryRepository, RepoError};
use crate::repo::store::EntryStore;
use crate::transfer::snapshot::{
    export_snapshot_to_path, stage_snapshot, stage_snapshot_from_path, StagedSnapshot,
    TransferError,
};
use chrono::{DateTime, Local};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

pub type BackupResult<T> = Result<T, BackupError>;

/// Proof that the user agreed to a destructive operation.
///
/// Construct it only after an explicit confirmation step.
#[derive(Debug)]
pub struct Confirmation {
    _private: (),
}

impl Confirmation {
    pub fn confirmed_by_user() -> Self {
        Self { _private: () }
    }
}

/// Why a text restore stopped.
#[derive(Debug)]
pub enum RestoreCause {
    Parse(ParseError),
    Create { line: usize, error: RepoError },
}

impl Display for RestoreCause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "{err}"),
            Self::Create { line, error } => {
                write!(f, "failed to create the entry for line {line}: {error}")
            }
        }
    }
}

/// Orchestrator error.
#[derive(Debug)]
pub enum BackupError {
    Repo(RepoError),
    Transfer(TransferError),
    Io {
        path: Option<PathBuf>,
        detail: String,
        source: io::Error,
    },
    /// Text restore stopped after the table was recreated.
    Restore {
        rows_restored: usize,
        lines_read: usize,
        cause: RestoreCause,
    },
}

impl BackupError {
    fn io(path: Option<&Path>, action: &str, source: io::Error) -> Self {
        Self::Io {
            path: path.map(Path::to_path_buf),
            detail: action.to_string(),
            source,
        }
    }
}

impl Display for BackupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Transfer(err) => write!(f, "{err}"),
            Self::Io {
                path: Some(path),
                detail,
                source,
            } => write!(f, "{detail} `{}`: {source}", path.display()),
            Self::Io {
                path: None,
                detail,
                source,
            } => write!(f, "{detail}: {source}"),
            Self::Restore {
                rows_restored,
                lines_read,
                cause,
            } => write!(
                f,
                "restore stopped after {rows_restored} entries ({lines_read} lines read): {cause}"
            ),
        }
    }
}

impl Error for BackupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Transfer(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::Restore {
                cause: RestoreCause::Parse(err),
                ..
            } => Some(err),
            Self::Restore {
                cause: RestoreCause::Create { error, .. },
                ..
            } => Some(error),
        }
    }
}

impl From<RepoError> for BackupError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<TransferError> for BackupError {
    fn from(value: TransferError) -> Self {
        Self::Transfer(value)
    }
}

/// Outcome of a text export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub entries_written: usize,
    /// Destination file, when the export created one.
    pub path: Option<PathBuf>,
}

/// Outcome of a successful text restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub rows_restored: usize,
    pub lines_read: usize,
    /// `modified_at` shared by every restored row.
    pub modified_at: i64,
}

impl Display for RestoreReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} lines restored.", self.lines_read)
    }
}

/// Outcome of a successful database replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceReport {
    pub rows_copied: u64,
    pub bytes_staged: u64,
}

/// A backup file found in a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Writes matching entries, in query order, as text lines.
pub fn export_text<R, W>(
    repo: &R,
    query: &EntryListQuery,
    writer: W,
    zone: DateZone,
) -> BackupResult<ExportReport>
where
    R: EntryRepository + ?Sized,
    W: Write,
{
    let started_at = Instant::now();
    info!(
        "event=text_export module=backup status=start filter={} sort={}",
        query.filter.name(),
        query.sort.name()
    );

    let mut text = TextWriter::new(writer, zone);
    let mut write_error = None;
    repo.visit_entries(query, &mut |entry| match text.write_entry(&entry) {
        Ok(()) => true,
        Err(err) => {
            write_error = Some(err);
            false
        }
    })?;
    if let Some(err) = write_error {
        error!("event=text_export module=backup status=error error={err}");
        return Err(BackupError::io(None, "write text backup", err));
    }
    let entries_written = text
        .finish()
        .map_err(|err| BackupError::io(None, "flush text backup", err))?;

    info!(
        "event=text_export module=backup status=ok entries={} duration_ms={}",
        entries_written,
        started_at.elapsed().as_millis()
    );
    Ok(ExportReport {
        entries_written,
        path: None,
    })
}

/// Exports into `dir` as `HeartNotes.<stamp>.txt`.
///
/// The file appears under its final name only after a complete write.
pub fn export_text_to_dir<R>(
    repo: &R,
    query: &EntryListQuery,
    dir: &Path,
    zone: DateZone,
    now: &DateTime<Local>,
) -> BackupResult<ExportReport>
where
    R: EntryRepository + ?Sized,
{
    let path = dir.join(BackupKind::Text.file_name(now));
    let partial = path.with_extension("txt.partial");

    let result = (|| -> BackupResult<ExportReport> {
        let file = File::create(&partial)
            .map_err(|err| BackupError::io(Some(&partial), "create text backup", err))?;
        let mut writer = BufWriter::new(file);
        let report = export_text(repo, query, &mut writer, zone)?;
        writer
            .into_inner()
            .map_err(|err| BackupError::io(Some(&partial), "flush text backup", err.into_error()))?
            .sync_all()
            .map_err(|err| BackupError::io(Some(&partial), "sync text backup", err))?;
        fs::rename(&partial, &path)
            .map_err(|err| BackupError::io(Some(&path), "finalize text backup", err))?;
        Ok(report)
    })();

    match result {
        Ok(report) => Ok(ExportReport {
            path: Some(path),
            ..report
        }),
        Err(err) => {
            let _ = fs::remove_file(&partial);
            Err(err)
        }
    }
}

/// Replaces every entry with the records parsed from `reader`.
///
/// The table is recreated before the first line is read. Parsing and
/// creation then proceed line by line and stop at the first failure.
pub fn restore_text<R, B>(
    repo: &R,
    reader: B,
    _confirmation: Confirmation,
) -> BackupResult<RestoreReport>
where
    R: EntryRepository + ?Sized,
    B: BufRead,
{
    let started_at = Instant::now();
    let modified_at = now_epoch_ms();
    info!("event=text_restore module=backup status=start");

    repo.recreate_table()?;

    let mut lines = TextReader::new(reader);
    let mut rows_restored = 0;
    while let Some(item) = lines.next() {
        let cause = match item {
            Ok((line, record)) => match repo.create_entry_stamped(&record.into_draft(), modified_at)
            {
                Ok(_) => {
                    rows_restored += 1;
                    continue;
                }
                Err(error) => RestoreCause::Create { line, error },
            },
            Err(err) => RestoreCause::Parse(err),
        };

        warn!(
            "event=text_restore module=backup status=error rows={} lines={} error={}",
            rows_restored,
            lines.lines_read(),
            cause
        );
        return Err(BackupError::Restore {
            rows_restored,
            lines_read: lines.lines_read(),
            cause,
        });
    }

    info!(
        "event=text_restore module=backup status=ok rows={} lines={} duration_ms={}",
        rows_restored,
        lines.lines_read(),
        started_at.elapsed().as_millis()
    );
    Ok(RestoreReport {
        rows_restored,
        lines_read: lines.lines_read(),
        modified_at,
    })
}

/// Restores from a file. The source is opened before the table is touched.
pub fn restore_text_from_path<R>(
    repo: &R,
    source: &Path,
    confirmation: Confirmation,
) -> BackupResult<RestoreReport>
where
    R: EntryRepository + ?Sized,
{
    let file = File::open(source)
        .map_err(|err| BackupError::io(Some(source), "open text backup", err))?;
    restore_text(repo, BufReader::new(file), confirmation)
}

/// Writes a byte-exact snapshot into `dir` as `HeartNotes.<stamp>.db`.
pub fn export_database_to_dir(
    store: &mut EntryStore,
    dir: &Path,
    now: &DateTime<Local>,
) -> BackupResult<PathBuf> {
    let path = dir.join(BackupKind::Database.file_name(now));
    export_snapshot_to_path(store, &path)?;
    Ok(path)
}

/// Stages `reader` under `staging_dir`, then replaces every row of the store
/// with the staged snapshot's rows.
pub fn replace_database<Rd: Read>(
    store: &EntryStore,
    reader: &mut Rd,
    source: &Path,
    staging_dir: &Path,
    confirmation: Confirmation,
) -> BackupResult<ReplaceReport> {
    let staged = stage_snapshot(reader, source, staging_dir)?;
    replace_from_staged(store, &staged, confirmation)
}

/// Same as `replace_database`, reading the snapshot from a file.
pub fn replace_database_from_path(
    store: &EntryStore,
    source: &Path,
    staging_dir: &Path,
    confirmation: Confirmation,
) -> BackupResult<ReplaceReport> {
    let staged = stage_snapshot_from_path(source, staging_dir)?;
    replace_from_staged(store, &staged, confirmation)
}

fn replace_from_staged(
    store: &EntryStore,
    staged: &StagedSnapshot,
    _confirmation: Confirmation,
) -> BackupResult<ReplaceReport> {
    let repo = store.repository()?;
    match repo.replace_all(staged.path()) {
        Ok(rows_copied) => {
            info!("event=db_replace module=backup status=ok rows={rows_copied}");
            Ok(ReplaceReport {
                rows_copied,
                bytes_staged: staged.len(),
            })
        }
        Err(err) => {
            error!("event=db_replace module=backup status=error error={err}");
            Err(err.into())
        }
    }
}

/// Lists backups of `kind` in `dir`, newest first.
pub fn list_backups(dir: &Path, kind: BackupKind) -> BackupResult<Vec<BackupFile>> {
    let entries =
        fs::read_dir(dir).map_err(|err| BackupError::io(Some(dir), "read backup directory", err))?;

    let mut backups = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|err| BackupError::io(Some(dir), "read backup directory", err))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !kind.matches_file_name(name) {
            continue;
        }
        let metadata = entry
            .metadata()
            .map_err(|err| BackupError::io(Some(&entry.path()), "stat backup", err))?;
        if !metadata.is_file() {
            continue;
        }
        backups.push(BackupFile {
            path: entry.path(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }

    backups.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| b.path.cmp(&a.path))
    });
    Ok(backups)
}
