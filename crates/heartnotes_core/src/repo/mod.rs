//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for entries.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes enforce `EntryDraft::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`,
//!   `StorageUnavailable`, `SourceUnreadable`) next to DB transport errors.

pub mod entry_repo;
pub mod store;
