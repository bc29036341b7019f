//! Core domain logic for HeartNotes.
//! This crate is the single source of truth for entry and backup invariants.

pub mod codec;
pub mod config;
pub mod db;
pub mod enrich;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod transfer;

pub use codec::text::{DateZone, ParseError, ParseErrorKind, TextReader, TextRecord, TextWriter};
pub use config::{BackupKind, StoreConfig, StoreSchema};
pub use enrich::{CancelToken, EnrichmentHandle, EnrichmentOutcome, EnrichmentSlot, WeatherSource};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use model::entry::{Entry, EntryDraft, EntryId, EntryValidationError};
pub use repo::entry_repo::{
    EntryFilter, EntryListQuery, EntryRepository, RepoError, RepoResult, SortOrder,
    SqliteEntryRepository,
};
pub use repo::store::EntryStore;
pub use service::backup_service::{
    BackupError, BackupResult, Confirmation, ExportReport, ReplaceReport, RestoreReport,
};
pub use service::entry_service::EntryService;
pub use transfer::snapshot::{TransferError, TransferResult};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
