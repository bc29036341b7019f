//! Entry table versioning.
//!
//! # Responsibility
//! - Create the entry table on a fresh database.
//! - Replace outdated tables by drop-and-recreate; no row migration exists.
//!
//! # Invariants
//! - Applied version is mirrored to `PRAGMA user_version`.
//! - A database newer than `latest_version()` is never touched.

use crate::config::StoreSchema;
use crate::db::{DbError, DbResult};
use log::warn;
use rusqlite::{Connection, TransactionBehavior};

const SCHEMA_VERSION: u32 = 1;

/// Returns the latest schema version known by this binary.
pub fn latest_version() -> u32 {
    SCHEMA_VERSION
}

/// Brings the connection's entry table up to `latest_version()`.
pub fn apply_migrations(conn: &mut Connection, schema: &StoreSchema) -> DbResult<()> {
    schema.validate()?;
    let latest = latest_version();
    if check_version(current_user_version(conn)?, latest)? {
        return Ok(());
    }

    // Re-read under the write lock; another connection may have won the race.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let current_version = current_user_version(&tx)?;
    if check_version(current_version, latest)? {
        return Ok(());
    }

    if current_version > 0 {
        warn!(
            "event=db_migrate module=db status=recreate from_version={} to_version={}",
            current_version, latest
        );
    }

    tx.execute_batch(&schema.drop_table_sql())?;
    tx.execute_batch(&schema.create_table_sql())?;
    tx.execute_batch(&format!("PRAGMA user_version = {latest};"))?;
    tx.commit()?;

    Ok(())
}

/// `Ok(true)` when already current, `Ok(false)` when the table must be built.
fn check_version(current_version: u32, latest: u32) -> DbResult<bool> {
    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }
    Ok(current_version == latest)
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
