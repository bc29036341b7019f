//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Sequence backup and restore flows across codec, transfer and store.
//! - Keep UI/FFI layers decoupled from storage details.

pub mod backup_service;
pub mod entry_service;
