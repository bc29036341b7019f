//! Byte-exact database snapshot transfer.
//!
//! # Responsibility
//! - Stream the live store's backing file out without copying while the
//!   connection is writable.
//! - Stage external snapshots locally before any merge reads them.
//!
//! # Invariants
//! - Export closes the store before reading its file and always attempts to
//!   reopen it, even when streaming failed.
//! - A destination written through `export_snapshot_to_path` is either the
//!   complete snapshot or absent; partial files are removed.
//! - Zero-byte results are failures.
//! - A `StagedSnapshot` deletes its file when dropped.

use crate::repo::store::EntryStore;
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

const COPY_BUFFER_BYTES: usize = 8 * 1024;
const STAGING_PREFIX: &str = "heartnotes-staging";

pub type TransferResult<T> = Result<T, TransferError>;

/// Snapshot I/O failure naming the offending path.
#[derive(Debug)]
pub struct TransferError {
    pub path: PathBuf,
    pub detail: String,
    source: Option<io::Error>,
}

impl TransferError {
    fn new(path: &Path, detail: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            detail: detail.into(),
            source: None,
        }
    }

    fn io(path: &Path, action: &str, err: io::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            detail: format!("{action}: {err}"),
            source: Some(err),
        }
    }
}

impl Display for TransferError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "transfer failed for `{}`: {}", self.path.display(), self.detail)
    }
}

impl Error for TransferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|err| err as &(dyn Error + 'static))
    }
}

/// Streams the store's backing file into `writer`.
///
/// `destination` only labels errors. Returns the number of bytes written.
pub fn export_snapshot<W: Write>(
    store: &mut EntryStore,
    writer: &mut W,
    destination: &Path,
) -> TransferResult<u64> {
    let started_at = Instant::now();
    let Some(db_path) = store.db_path().map(Path::to_path_buf) else {
        return Err(TransferError::new(
            destination,
            "in-memory store has no backing file",
        ));
    };
    info!("event=snapshot_export module=transfer status=start");

    let was_open = store.is_open();
    store
        .close()
        .map_err(|err| TransferError::new(&db_path, format!("close store: {err}")))?;

    let copied = File::open(&db_path)
        .map_err(|err| TransferError::io(&db_path, "open store file", err))
        .and_then(|mut file| copy_stream(&mut file, writer, &db_path, destination));

    let reopened = if was_open {
        store.reopen()
    } else {
        Ok(())
    };

    let bytes = match copied {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(
                "event=snapshot_export module=transfer status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err);
        }
    };
    reopened.map_err(|err| TransferError::new(&db_path, format!("reopen store: {err}")))?;
    if bytes == 0 {
        return Err(TransferError::new(&db_path, "store file is empty"));
    }

    info!(
        "event=snapshot_export module=transfer status=ok bytes={} duration_ms={}",
        bytes,
        started_at.elapsed().as_millis()
    );
    Ok(bytes)
}

/// Exports to `destination`, replacing it only once the copy is complete.
pub fn export_snapshot_to_path(store: &mut EntryStore, destination: &Path) -> TransferResult<u64> {
    let partial = partial_path(destination);
    let result = (|| -> TransferResult<u64> {
        let file = File::create(&partial)
            .map_err(|err| TransferError::io(&partial, "create destination", err))?;
        let mut writer = BufWriter::new(file);
        let bytes = export_snapshot(store, &mut writer, destination)?;
        let file = writer
            .into_inner()
            .map_err(|err| TransferError::io(&partial, "flush destination", err.into_error()))?;
        file.sync_all()
            .map_err(|err| TransferError::io(&partial, "sync destination", err))?;
        fs::rename(&partial, destination)
            .map_err(|err| TransferError::io(destination, "finalize destination", err))?;
        Ok(bytes)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

/// A snapshot copied into the local staging area.
#[derive(Debug)]
pub struct StagedSnapshot {
    path: PathBuf,
    bytes: u64,
}

impl StagedSnapshot {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }
}

impl Drop for StagedSnapshot {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Streams an external snapshot into a fresh file under `staging_dir`.
///
/// `source` only labels errors.
pub fn stage_snapshot<R: Read>(
    reader: &mut R,
    source: &Path,
    staging_dir: &Path,
) -> TransferResult<StagedSnapshot> {
    fs::create_dir_all(staging_dir)
        .map_err(|err| TransferError::io(staging_dir, "create staging directory", err))?;
    let path = staging_dir.join(format!("{STAGING_PREFIX}-{}.db", Uuid::new_v4()));

    let result = (|| -> TransferResult<u64> {
        let mut file =
            File::create(&path).map_err(|err| TransferError::io(&path, "create staging", err))?;
        let bytes = copy_stream(reader, &mut file, source, &path)?;
        file.sync_all()
            .map_err(|err| TransferError::io(&path, "sync staging", err))?;
        if bytes == 0 {
            return Err(TransferError::new(source, "source is empty"));
        }
        Ok(bytes)
    })();

    match result {
        Ok(bytes) => {
            info!("event=snapshot_stage module=transfer status=ok bytes={bytes}");
            Ok(StagedSnapshot { path, bytes })
        }
        Err(err) => {
            let _ = fs::remove_file(&path);
            error!("event=snapshot_stage module=transfer status=error error={err}");
            Err(err)
        }
    }
}

/// Opens `source` and stages it under `staging_dir`.
pub fn stage_snapshot_from_path(
    source: &Path,
    staging_dir: &Path,
) -> TransferResult<StagedSnapshot> {
    let mut file = File::open(source).map_err(|err| TransferError::io(source, "open source", err))?;
    stage_snapshot(&mut file, source, staging_dir)
}

fn copy_stream<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    read_path: &Path,
    write_path: &Path,
) -> TransferResult<u64> {
    let mut buffer = [0_u8; COPY_BUFFER_BYTES];
    let mut total = 0_u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(TransferError::io(read_path, "read", err)),
        };
        writer
            .write_all(&buffer[..read])
            .map_err(|err| TransferError::io(write_path, "write", err))?;
        total += read as u64;
    }
    writer
        .flush()
        .map_err(|err| TransferError::io(write_path, "flush", err))?;
    Ok(total)
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    destination.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::{partial_path, stage_snapshot};
    use std::path::Path;

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/tmp/HeartNotes.2024-01-01-000000.db")),
            Path::new("/tmp/HeartNotes.2024-01-01-000000.db.partial")
        );
    }

    #[test]
    fn staging_rejects_empty_source_and_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut empty: &[u8] = &[];
        let err = stage_snapshot(&mut empty, Path::new("empty.db"), dir.path()).unwrap_err();
        assert_eq!(err.path, Path::new("empty.db"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn staged_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes: &[u8] = b"SQLite format 3\0payload";
        let staged = stage_snapshot(&mut bytes, Path::new("src.db"), dir.path()).unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.is_file());
        assert_eq!(staged.len(), 23);
        drop(staged);
        assert!(!path.exists());
    }
}
