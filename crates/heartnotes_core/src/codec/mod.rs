//! Portable text codecs for entry backups.

pub mod text;
