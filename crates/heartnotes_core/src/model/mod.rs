//! Domain model for count/total observations.
//!
//! # Responsibility
//! - Define the canonical entry record exchanged between store, codec and UI.
//! - Keep boundary validation next to the data it guards.
//!
//! # Invariants
//! - Every persisted entry is identified by a store-assigned `EntryId`.
//! - `count`, `total` and timestamps are never negative once persisted.

pub mod entry;
