//! Open/close lifecycle for one entry store.
//!
//! # Responsibility
//! - Own the live SQLite connection and the schema it was opened with.
//! - Hand out repositories only while the store is open.
//!
//! # Invariants
//! - A closed store answers every repository request with
//!   `RepoError::StorageUnavailable`.
//! - In-memory stores have no backing file and cannot be reopened.

use crate::config::{StoreConfig, StoreSchema};
use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::repo::entry_repo::{RepoError, RepoResult, SqliteEntryRepository};
use log::{info, warn};
use rusqlite::Connection;
use std::path::Path;

/// Live entry store handle.
pub struct EntryStore {
    config: StoreConfig,
    conn: Option<Connection>,
    in_memory: bool,
}

impl EntryStore {
    /// Opens (creating when needed) the file-backed store described by `config`.
    pub fn open(config: StoreConfig) -> DbResult<Self> {
        let conn = open_db(&config.db_path, &config.schema)?;
        Ok(Self {
            config,
            conn: Some(conn),
            in_memory: false,
        })
    }

    /// Opens a throwaway in-memory store.
    pub fn open_in_memory(schema: StoreSchema) -> DbResult<Self> {
        let conn = open_db_in_memory(&schema)?;
        Ok(Self {
            config: StoreConfig {
                db_path: ":memory:".into(),
                schema,
            },
            conn: Some(conn),
            in_memory: true,
        })
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    pub fn schema(&self) -> &StoreSchema {
        &self.config.schema
    }

    /// Backing file path; `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        if self.in_memory {
            None
        } else {
            Some(self.config.db_path.as_path())
        }
    }

    /// Returns the live connection or `StorageUnavailable`.
    pub fn connection(&self) -> RepoResult<&Connection> {
        self.conn.as_ref().ok_or(RepoError::StorageUnavailable)
    }

    /// Returns a repository bound to the live connection.
    pub fn repository(&self) -> RepoResult<SqliteEntryRepository<'_>> {
        SqliteEntryRepository::try_new(self.connection()?, &self.config.schema)
    }

    /// Closes the connection, flushing all committed writes to the file.
    ///
    /// Closing an already closed store is a no-op.
    pub fn close(&mut self) -> RepoResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        match conn.close() {
            Ok(()) => {
                info!("event=store_close module=repo status=ok");
                Ok(())
            }
            Err((conn, err)) => {
                warn!("event=store_close module=repo status=error error={err}");
                self.conn = Some(conn);
                Err(err.into())
            }
        }
    }

    /// Reopens a closed file-backed store. No-op when already open.
    pub fn reopen(&mut self) -> RepoResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        if self.in_memory {
            return Err(RepoError::StorageUnavailable);
        }
        let conn = open_db(&self.config.db_path, &self.config.schema)?;
        self.conn = Some(conn);
        info!("event=store_reopen module=repo status=ok");
        Ok(())
    }
}
