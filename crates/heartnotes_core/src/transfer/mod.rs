//! Whole-database snapshot transfer.
//!
//! # Responsibility
//! - Copy the store's backing file out, and stage external snapshots in.
//!
//! # Invariants
//! - Transfer never interprets rows; merges go through `EntryRepository::replace_all`.

pub mod snapshot;
