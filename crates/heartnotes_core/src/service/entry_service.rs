//! Entry use-case service.
//!
//! # Responsibility
//! - Provide the list/create/update/delete entry points UI callers use.
//! - Apply the edit-screen conventions for the `edited` flag.
//!
//! # Invariants
//! - Service APIs never bypass repository validation/persistence contracts.
//! - Service layer remains storage-agnostic.

use crate::model::entry::{Entry, EntryDraft, EntryId};
use crate::repo::entry_repo::{EntryListQuery, EntryRepository, RepoResult};

/// Use-case service wrapper for entry operations.
pub struct EntryService<R: EntryRepository> {
    repo: R,
}

impl<R: EntryRepository> EntryService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates an entry from a caller-built draft.
    pub fn create_entry(&self, draft: &EntryDraft) -> RepoResult<EntryId> {
        self.repo.create_entry(draft)
    }

    /// Records a fresh observation; new entries start unedited.
    pub fn record(
        &self,
        observed_at: i64,
        count: i64,
        total: i64,
        comment: impl Into<String>,
    ) -> RepoResult<EntryId> {
        self.repo
            .create_entry(&EntryDraft::new(observed_at, count, total, comment))
    }

    /// Full-row update by id. `Ok(false)` when the id has no row.
    pub fn update_entry(&self, id: EntryId, draft: &EntryDraft) -> RepoResult<bool> {
        self.repo.update_entry(id, draft)
    }

    /// Rewrites an existing entry from the edit screen and flags it edited.
    pub fn revise(
        &self,
        id: EntryId,
        observed_at: i64,
        count: i64,
        total: i64,
        comment: impl Into<String>,
    ) -> RepoResult<bool> {
        let draft = EntryDraft::new(observed_at, count, total, comment).edited();
        self.repo.update_entry(id, &draft)
    }

    pub fn delete_entry(&self, id: EntryId) -> RepoResult<bool> {
        self.repo.delete_entry(id)
    }

    pub fn get_entry(&self, id: EntryId) -> RepoResult<Entry> {
        self.repo.get_entry(id)
    }

    /// Lists entries with the query's filter and sort order.
    pub fn list_entries(&self, query: &EntryListQuery) -> RepoResult<Vec<Entry>> {
        self.repo.list_entries(query)
    }

    pub fn count_entries(&self) -> RepoResult<u64> {
        self.repo.count_entries()
    }

    /// Borrows the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repo
    }
}
