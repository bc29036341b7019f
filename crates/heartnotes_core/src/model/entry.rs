//! Entry domain model.
//!
//! # Responsibility
//! - Define the stored observation record (`Entry`) and the caller-supplied
//!   field set used for create/update (`EntryDraft`).
//! - Reject negative tallies and timestamps at the boundary.
//!
//! # Invariants
//! - `id` is assigned by the store and never reused while the table lives.
//! - `modified_at` is owned by the store; drafts cannot set it.
//! - `count > total` is an allowed state and is not rejected.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned row identifier.
pub type EntryId = i64;

/// Validation failures for entry fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryValidationError {
    NegativeCount(i64),
    NegativeTotal(i64),
    NegativeTimestamp(i64),
}

impl Display for EntryValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NegativeCount(value) => write!(f, "count must be >= 0, got {value}"),
            Self::NegativeTotal(value) => write!(f, "total must be >= 0, got {value}"),
            Self::NegativeTimestamp(value) => {
                write!(f, "observed_at must be >= 0, got {value}")
            }
        }
    }
}

impl Error for EntryValidationError {}

/// One persisted count/total observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    /// Unix epoch milliseconds of the observed event.
    pub observed_at: i64,
    /// Unix epoch milliseconds of the last store write.
    pub modified_at: i64,
    pub count: i64,
    pub total: i64,
    /// True once the record was edited or came from an import path.
    pub edited: bool,
    /// Free text; may contain newlines and tabs.
    pub comment: String,
}

impl Entry {
    /// Returns the caller-editable fields of this entry.
    pub fn to_draft(&self) -> EntryDraft {
        EntryDraft {
            observed_at: self.observed_at,
            count: self.count,
            total: self.total,
            edited: self.edited,
            comment: self.comment.clone(),
        }
    }

    /// Validates persisted state with the same rules as drafts.
    pub fn validate(&self) -> Result<(), EntryValidationError> {
        validate_fields(self.observed_at, self.count, self.total)?;
        if self.modified_at < 0 {
            return Err(EntryValidationError::NegativeTimestamp(self.modified_at));
        }
        Ok(())
    }
}

/// Field set written by Create/Update.
///
/// Deserialization runs `validate()`, so a decoded draft is always writable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEntryDraft")]
pub struct EntryDraft {
    pub observed_at: i64,
    pub count: i64,
    pub total: i64,
    pub edited: bool,
    pub comment: String,
}

impl EntryDraft {
    /// Creates a fresh, unedited draft.
    pub fn new(observed_at: i64, count: i64, total: i64, comment: impl Into<String>) -> Self {
        Self {
            observed_at,
            count,
            total,
            edited: false,
            comment: comment.into(),
        }
    }

    /// Returns the same draft flagged as edited.
    pub fn edited(mut self) -> Self {
        self.edited = true;
        self
    }

    pub fn validate(&self) -> Result<(), EntryValidationError> {
        validate_fields(self.observed_at, self.count, self.total)
    }
}

#[derive(Deserialize)]
struct RawEntryDraft {
    observed_at: i64,
    count: i64,
    total: i64,
    #[serde(default)]
    edited: bool,
    #[serde(default)]
    comment: String,
}

impl TryFrom<RawEntryDraft> for EntryDraft {
    type Error = EntryValidationError;

    fn try_from(raw: RawEntryDraft) -> Result<Self, Self::Error> {
        let draft = EntryDraft {
            observed_at: raw.observed_at,
            count: raw.count,
            total: raw.total,
            edited: raw.edited,
            comment: raw.comment,
        };
        draft.validate()?;
        Ok(draft)
    }
}

fn validate_fields(observed_at: i64, count: i64, total: i64) -> Result<(), EntryValidationError> {
    if count < 0 {
        return Err(EntryValidationError::NegativeCount(count));
    }
    if total < 0 {
        return Err(EntryValidationError::NegativeTotal(total));
    }
    if observed_at < 0 {
        return Err(EntryValidationError::NegativeTimestamp(observed_at));
    }
    Ok(())
}
