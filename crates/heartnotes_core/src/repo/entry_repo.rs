//! Entry repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD, filtered/sorted listing and destructive table operations
//!   over the entry table.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths validate the draft before any SQL mutation.
//! - Every create/update stamps `modified_at`; callers cannot bypass it.
//! - Read paths reject invalid persisted state instead of masking it.
//! - `replace_all` validates the source before the live table is cleared;
//!   a failure after clearing leaves the table empty.

use crate::config::StoreSchema;
use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::entry::{Entry, EntryDraft, EntryId, EntryValidationError};
use log::{error, info};
use rusqlite::{params, Connection, OpenFlags, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Instant;

const SNAPSHOT_ALIAS: &str = "snapshot_source";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for entry persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(EntryValidationError),
    Db(DbError),
    NotFound(EntryId),
    InvalidData(String),
    /// The store is closed or was never opened.
    StorageUnavailable,
    /// A replace source is not a readable store of the same schema.
    SourceUnreadable {
        path: PathBuf,
        detail: String,
    },
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(String),
    MissingRequiredColumn {
        table: String,
        column: String,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "entry not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted entry data: {message}"),
            Self::StorageUnavailable => write!(f, "entry store is not open"),
            Self::SourceUnreadable { path, detail } => write!(
                f,
                "cannot read `{}` as an entry store: {detail}",
                path.display()
            ),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EntryValidationError> for RepoError {
    fn from(value: EntryValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Fixed set of fetch-time predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryFilter {
    #[default]
    None,
    /// `count != 0`
    NonZero,
    /// `count == total`
    CountEqualsTotal,
}

impl EntryFilter {
    pub const ALL: [EntryFilter; 3] = [Self::None, Self::NonZero, Self::CountEqualsTotal];

    /// Stable external name used by callers to select a filter.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::NonZero => "nonzero",
            Self::CountEqualsTotal => "countEqualsTotal",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|filter| filter.name().eq_ignore_ascii_case(name.trim()))
    }

    fn predicate(self, schema: &StoreSchema) -> Option<String> {
        match self {
            Self::None => None,
            Self::NonZero => Some(format!("{} != 0", schema.count)),
            Self::CountEqualsTotal => Some(format!("{} = {}", schema.count, schema.total)),
        }
    }
}

/// Ordering by `observed_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(Self::Ascending),
            "desc" | "descending" => Some(Self::Descending),
            _ => None,
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Query options for listing entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryListQuery {
    pub filter: EntryFilter,
    pub sort: SortOrder,
}

impl EntryListQuery {
    pub fn new(filter: EntryFilter, sort: SortOrder) -> Self {
        Self { filter, sort }
    }
}

/// Repository interface for entry operations.
pub trait EntryRepository {
    /// Inserts a new row with `modified_at` set to `modified_at`.
    fn create_entry_stamped(&self, draft: &EntryDraft, modified_at: i64) -> RepoResult<EntryId>;
    /// Rewrites every field except `id`; `Ok(false)` when no row matched.
    fn update_entry(&self, id: EntryId, draft: &EntryDraft) -> RepoResult<bool>;
    /// `Ok(false)` when no row matched.
    fn delete_entry(&self, id: EntryId) -> RepoResult<bool>;
    fn get_entry(&self, id: EntryId) -> RepoResult<Entry>;
    /// Streams matching rows in query order until `visit` returns `false`.
    ///
    /// Each call re-queries; no cursor state survives across calls.
    fn visit_entries(
        &self,
        query: &EntryListQuery,
        visit: &mut dyn FnMut(Entry) -> bool,
    ) -> RepoResult<usize>;
    fn count_entries(&self) -> RepoResult<u64>;
    /// Drops and recreates the table. All rows are lost.
    fn recreate_table(&self) -> RepoResult<()>;
    /// Clears the table and copies every row of the store at `source_path`.
    fn replace_all(&self, source_path: &Path) -> RepoResult<u64>;

    /// Inserts a new row stamped with the current time.
    fn create_entry(&self, draft: &EntryDraft) -> RepoResult<EntryId> {
        self.create_entry_stamped(draft, now_epoch_ms())
    }

    /// Collects matching rows in query order.
    fn list_entries(&self, query: &EntryListQuery) -> RepoResult<Vec<Entry>> {
        let mut entries = Vec::new();
        self.visit_entries(query, &mut |entry| {
            entries.push(entry);
            true
        })?;
        Ok(entries)
    }
}

/// Current wall clock in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// SQLite-backed entry repository.
pub struct SqliteEntryRepository<'conn> {
    conn: &'conn Connection,
    schema: &'conn StoreSchema,
    select_sql: String,
}

impl<'conn> SqliteEntryRepository<'conn> {
    /// Constructs a repository from a connection whose schema was applied.
    pub fn try_new(conn: &'conn Connection, schema: &'conn StoreSchema) -> RepoResult<Self> {
        schema.validate().map_err(DbError::from)?;
        ensure_connection_ready(conn, schema)?;
        let select_sql = format!("SELECT {} FROM {}", schema.column_list(), schema.table);
        Ok(Self {
            conn,
            schema,
            select_sql,
        })
    }

    fn validate_source(&self, source_path: &Path) -> RepoResult<()> {
        let unreadable = |detail: String| RepoError::SourceUnreadable {
            path: source_path.to_path_buf(),
            detail,
        };

        if !source_path.is_file() {
            return Err(unreadable("file does not exist".to_string()));
        }
        let source = Connection::open_with_flags(
            source_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| unreadable(err.to_string()))?;

        let columns = table_columns(&source, &self.schema.table)
            .map_err(|err| unreadable(err.to_string()))?;
        if columns.is_empty() {
            return Err(unreadable(format!("table `{}` not found", self.schema.table)));
        }
        if let Some(missing) = missing_column(&columns, self.schema) {
            return Err(unreadable(format!(
                "column `{}.{missing}` not found",
                self.schema.table
            )));
        }

        let invalid_rows: i64 = source
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM {table}
                     WHERE typeof({id}) != 'integer'
                        OR typeof({date}) != 'integer' OR {date} < 0
                        OR typeof({datemod}) != 'integer' OR {datemod} < 0
                        OR typeof({count}) != 'integer' OR {count} < 0
                        OR typeof({total}) != 'integer' OR {total} < 0
                        OR typeof({edited}) != 'integer' OR {edited} NOT IN (0, 1)
                        OR typeof({comment}) != 'text';",
                    table = self.schema.table,
                    id = self.schema.id,
                    date = self.schema.observed_at,
                    datemod = self.schema.modified_at,
                    count = self.schema.count,
                    total = self.schema.total,
                    edited = self.schema.edited,
                    comment = self.schema.comment,
                ),
                [],
                |row| row.get(0),
            )
            .map_err(|err| unreadable(err.to_string()))?;
        if invalid_rows > 0 {
            return Err(unreadable(format!(
                "{invalid_rows} row(s) hold null, non-integer, negative or out-of-range values"
            )));
        }

        Ok(())
    }

    fn copy_from_attached(&self) -> RepoResult<u64> {
        let columns = self.schema.column_list();
        let copied = self.conn.execute(
            &format!(
                "INSERT INTO main.{table} ({columns})
                 SELECT {columns} FROM {SNAPSHOT_ALIAS}.{table};",
                table = self.schema.table,
            ),
            [],
        )?;
        Ok(copied as u64)
    }
}

impl EntryRepository for SqliteEntryRepository<'_> {
    fn create_entry_stamped(&self, draft: &EntryDraft, modified_at: i64) -> RepoResult<EntryId> {
        draft.validate()?;
        if modified_at < 0 {
            return Err(EntryValidationError::NegativeTimestamp(modified_at).into());
        }

        let s = self.schema;
        self.conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                s.table, s.observed_at, s.modified_at, s.count, s.total, s.edited, s.comment
            ),
            params![
                draft.observed_at,
                modified_at,
                draft.count,
                draft.total,
                bool_to_int(draft.edited),
                draft.comment.as_str(),
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn update_entry(&self, id: EntryId, draft: &EntryDraft) -> RepoResult<bool> {
        draft.validate()?;

        let s = self.schema;
        let changed = self.conn.execute(
            &format!(
                "UPDATE {}
                 SET {} = ?1, {} = ?2, {} = ?3, {} = ?4, {} = ?5, {} = ?6
                 WHERE {} = ?7;",
                s.table,
                s.observed_at,
                s.modified_at,
                s.count,
                s.total,
                s.edited,
                s.comment,
                s.id
            ),
            params![
                draft.observed_at,
                now_epoch_ms(),
                draft.count,
                draft.total,
                bool_to_int(draft.edited),
                draft.comment.as_str(),
                id,
            ],
        )?;

        Ok(changed > 0)
    }

    fn delete_entry(&self, id: EntryId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1;",
                self.schema.table, self.schema.id
            ),
            [id],
        )?;
        Ok(changed > 0)
    }

    fn get_entry(&self, id: EntryId) -> RepoResult<Entry> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE {} = ?1;",
            self.select_sql, self.schema.id
        ))?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => parse_entry_row(row),
            None => Err(RepoError::NotFound(id)),
        }
    }

    fn visit_entries(
        &self,
        query: &EntryListQuery,
        visit: &mut dyn FnMut(Entry) -> bool,
    ) -> RepoResult<usize> {
        let mut sql = self.select_sql.clone();
        if let Some(predicate) = query.filter.predicate(self.schema) {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }
        let direction = query.sort.keyword();
        sql.push_str(&format!(
            " ORDER BY {} {direction}, {} {direction};",
            self.schema.observed_at, self.schema.id
        ));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut visited = 0;
        while let Some(row) = rows.next()? {
            visited += 1;
            if !visit(parse_entry_row(row)?) {
                break;
            }
        }
        Ok(visited)
    }

    fn count_entries(&self) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {};", self.schema.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn recreate_table(&self) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(&self.schema.drop_table_sql())?;
        tx.execute_batch(&self.schema.create_table_sql())?;
        tx.commit()?;
        info!("event=table_recreate module=repo status=ok");
        Ok(())
    }

    fn replace_all(&self, source_path: &Path) -> RepoResult<u64> {
        let started_at = Instant::now();
        info!("event=replace_all module=repo status=start");
        self.validate_source(source_path)?;
        let source_text = source_path
            .to_str()
            .ok_or_else(|| RepoError::SourceUnreadable {
                path: source_path.to_path_buf(),
                detail: "path is not valid UTF-8".to_string(),
            })?;

        // Point of no return: the live table is empty from here on.
        self.recreate_table()?;
        self.conn.execute(
            &format!("ATTACH DATABASE ?1 AS {SNAPSHOT_ALIAS};"),
            [source_text],
        )?;
        let copied = self.copy_from_attached();
        let detached = self
            .conn
            .execute_batch(&format!("DETACH DATABASE {SNAPSHOT_ALIAS};"));

        match (&copied, &detached) {
            (Ok(rows), Ok(())) => info!(
                "event=replace_all module=repo status=ok rows={} duration_ms={}",
                rows,
                started_at.elapsed().as_millis()
            ),
            _ => error!(
                "event=replace_all module=repo status=error duration_ms={} table_state=cleared",
                started_at.elapsed().as_millis()
            ),
        }

        let copied = copied?;
        detached?;
        Ok(copied)
    }
}

fn ensure_connection_ready(conn: &Connection, schema: &StoreSchema) -> RepoResult<()> {
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let expected_version = latest_version();
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let columns = table_columns(conn, &schema.table)?;
    if columns.is_empty() {
        return Err(RepoError::MissingRequiredTable(schema.table.clone()));
    }
    if let Some(column) = missing_column(&columns, schema) {
        return Err(RepoError::MissingRequiredColumn {
            table: schema.table.clone(),
            column: column.to_string(),
        });
    }
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

fn missing_column<'s>(columns: &[String], schema: &'s StoreSchema) -> Option<&'s str> {
    schema
        .columns()
        .into_iter()
        .find(|required| !columns.iter().any(|column| column == required))
}

fn parse_entry_row(row: &Row<'_>) -> RepoResult<Entry> {
    let edited = match row.get::<_, i64>(5)? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid edited value `{other}`"
            )));
        }
    };

    let entry = Entry {
        id: row.get(0)?,
        observed_at: row.get(1)?,
        modified_at: row.get(2)?,
        count: row.get(3)?,
        total: row.get(4)?,
        edited,
        comment: row.get(6)?,
    };
    entry.validate().map_err(|err| {
        RepoError::InvalidData(format!("entry {} failed validation: {err}", entry.id))
    })?;
    Ok(entry)
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
