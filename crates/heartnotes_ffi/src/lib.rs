//! Flutter-facing bindings for HeartNotes.

pub mod api;
