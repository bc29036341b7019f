//! Store configuration and schema naming.
//!
//! # Responsibility
//! - Carry table/column names explicitly into the store constructor.
//! - Resolve the backing database path from the environment.
//! - Own backup filename conventions.
//!
//! # Invariants
//! - Every identifier in `StoreSchema` matches `^[A-Za-z_][A-Za-z0-9_]*$`
//!   before it is interpolated into SQL.

use chrono::{DateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Environment variable that overrides the database location.
pub const DB_PATH_ENV: &str = "HEARTNOTES_DB_PATH";
/// Default database file name.
pub const DB_FILE_NAME: &str = "HeartNotes.db";
/// Prefix shared by every backup file name.
pub const BACKUP_PREFIX: &str = "HeartNotes";

const BACKUP_STAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S";

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Invalid schema identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    pub role: &'static str,
    pub value: String,
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {} identifier `{}`", self.role, self.value)
    }
}

impl Error for SchemaError {}

/// Table and column names for the entry table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSchema {
    pub table: String,
    pub id: String,
    pub observed_at: String,
    pub modified_at: String,
    pub count: String,
    pub total: String,
    pub edited: String,
    pub comment: String,
}

impl Default for StoreSchema {
    fn default() -> Self {
        Self {
            table: "data".to_string(),
            id: "_id".to_string(),
            observed_at: "date".to_string(),
            modified_at: "datemod".to_string(),
            count: "count".to_string(),
            total: "total".to_string(),
            edited: "edited".to_string(),
            comment: "comment".to_string(),
        }
    }
}

impl StoreSchema {
    /// Checks every identifier before it reaches generated SQL.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for (role, value) in self.named_identifiers() {
            if !IDENTIFIER_RE.is_match(value) {
                return Err(SchemaError {
                    role,
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Column names in storage order, id first.
    pub fn columns(&self) -> [&str; 7] {
        [
            self.id.as_str(),
            self.observed_at.as_str(),
            self.modified_at.as_str(),
            self.count.as_str(),
            self.total.as_str(),
            self.edited.as_str(),
            self.comment.as_str(),
        ]
    }

    /// Comma-separated column list in storage order.
    pub fn column_list(&self) -> String {
        self.columns().join(", ")
    }

    /// `CREATE TABLE` statement for the entry table.
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE {table} (
                {id} INTEGER PRIMARY KEY AUTOINCREMENT,
                {date} INTEGER NOT NULL,
                {datemod} INTEGER NOT NULL,
                {count} INTEGER NOT NULL,
                {total} INTEGER NOT NULL,
                {edited} INTEGER NOT NULL,
                {comment} TEXT NOT NULL
            );",
            table = self.table,
            id = self.id,
            date = self.observed_at,
            datemod = self.modified_at,
            count = self.count,
            total = self.total,
            edited = self.edited,
            comment = self.comment,
        )
    }

    /// `DROP TABLE IF EXISTS` statement for the entry table.
    pub fn drop_table_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {};", self.table)
    }

    fn named_identifiers(&self) -> [(&'static str, &str); 8] {
        [
            ("table", self.table.as_str()),
            ("id column", self.id.as_str()),
            ("observed_at column", self.observed_at.as_str()),
            ("modified_at column", self.modified_at.as_str()),
            ("count column", self.count.as_str()),
            ("total column", self.total.as_str()),
            ("edited column", self.edited.as_str()),
            ("comment column", self.comment.as_str()),
        ]
    }
}

/// Location and schema of one entry store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub schema: StoreSchema,
}

impl StoreConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            schema: StoreSchema::default(),
        }
    }

    /// Resolves `HEARTNOTES_DB_PATH`, falling back to the temp directory.
    pub fn from_env() -> Self {
        if let Ok(raw) = std::env::var(DB_PATH_ENV) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Self::new(trimmed);
            }
        }
        Self::new(std::env::temp_dir().join(DB_FILE_NAME))
    }

    pub fn with_schema(mut self, schema: StoreSchema) -> Self {
        self.schema = schema;
        self
    }
}

/// Kind of backup artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    /// Tab-delimited text dump.
    Text,
    /// Byte-exact database snapshot.
    Database,
}

impl BackupKind {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Database => "db",
        }
    }

    /// Builds `HeartNotes.<yyyy-MM-dd-HHmmss>.<ext>` for the given instant.
    pub fn file_name<Tz: TimeZone>(self, now: &DateTime<Tz>) -> String
    where
        Tz::Offset: Display,
    {
        format!(
            "{BACKUP_PREFIX}.{}.{}",
            now.format(BACKUP_STAMP_FORMAT),
            self.extension()
        )
    }

    /// Returns true when `name` follows this kind's naming convention.
    pub fn matches_file_name(self, name: &str) -> bool {
        let pattern = match self {
            Self::Text => &*TEXT_BACKUP_RE,
            Self::Database => &*DATABASE_BACKUP_RE,
        };
        pattern.is_match(name)
    }
}

static TEXT_BACKUP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^HeartNotes\.\d{4}-\d{2}-\d{2}-\d{6}\.txt$").expect("valid text backup regex")
});
static DATABASE_BACKUP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^HeartNotes\.\d{4}-\d{2}-\d{2}-\d{6}\.db$").expect("valid db backup regex")
});
