//! Storage Backend abstraction: one trait implemented by `memory-storage`'s
//! embedded-database backend, so the engine never depends on a concrete
//! database crate. See `spec.md` §4.1.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{AgingProfile, Memory, MemoryId, Relationship, Scope, Tier};

/// Filter accepted by `StorageBackend::scan`. `None` fields are
/// unconstrained.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    /// Restrict to one tier.
    pub tier: Option<Tier>,
    /// Restrict to one scope.
    pub scope: Option<Scope>,
    /// Restrict to one project (only meaningful with `scope = Project`).
    pub project_id: Option<String>,
    /// Restrict to memories carrying this tag.
    pub tag: Option<String>,
    /// Restrict to memories created at or after this instant.
    pub since: Option<DateTime<Utc>>,
}

/// Durable, crash-safe storage of memories, relationships, and aging
/// profiles, with indexed lookup by id, tier, scope, project, tags,
/// recency, and content terms.
///
/// All operations are async so that both a network-backed embedded
/// database (libsql) and a purely local one can implement this trait
/// uniformly.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Atomic upsert. Returns `Error::Conflict` if a byte-identical memory
    /// already exists in the same `(tier, scope, project)` and the caller
    /// asked for deduplication to be enforced at the storage layer.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` on I/O failure; the write makes
    /// no durable change in that case.
    async fn put(&self, memory: &Memory) -> Result<()>;

    /// Fetch a memory by id, or `None` if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` on I/O failure.
    async fn get(&self, id: MemoryId) -> Result<Option<Memory>>;

    /// Remove a single memory (relationship cascade is the caller's
    /// responsibility, driven by `dedup::cascade_delete_targets`). Returns
    /// `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` on I/O failure.
    async fn delete(&self, id: MemoryId) -> Result<bool>;

    /// Lazily enumerate memories matching `filter`. Not resumable beyond
    /// reissuing the call with the same filter.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` on I/O failure.
    async fn scan(&self, filter: &ScanFilter) -> Result<Vec<Memory>>;

    /// Lexical prefilter: ids of memories whose tokenized content contains
    /// any of `terms`, via the inverted term index.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` on I/O failure.
    async fn term_index_lookup(&self, terms: &[String]) -> Result<Vec<MemoryId>>;

    /// Ids of memories carrying `tag`, via the tag index.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` on I/O failure.
    async fn tag_index_lookup(&self, tag: &str) -> Result<Vec<MemoryId>>;

    /// Atomically bump `accessed_at`/`access_count` for `id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` on I/O failure.
    async fn record_access(&self, id: MemoryId, at: DateTime<Utc>) -> Result<()>;

    /// Upsert a relationship edge (already canonicalized by
    /// `Relationship::new`).
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` on I/O failure.
    async fn put_relationship(&self, relationship: &Relationship) -> Result<()>;

    /// All edges touching `id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` on I/O failure.
    async fn relationships_for(&self, id: MemoryId) -> Result<Vec<Relationship>>;

    /// Remove every edge touching `id` (used on non-cascading delete, for
    /// lazy cleanup, and as part of cascade delete).
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` on I/O failure.
    async fn delete_relationships_touching(&self, id: MemoryId) -> Result<u64>;

    /// Upsert an aging profile.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` on I/O failure.
    async fn put_aging_profile(&self, profile: &AgingProfile) -> Result<()>;

    /// Fetch a memory's aging profile, if one has been computed.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` on I/O failure.
    async fn get_aging_profile(&self, id: MemoryId) -> Result<Option<AgingProfile>>;

    /// Every aging profile whose `next_evaluation_at <= as_of`, for the
    /// background sweep.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` on I/O failure.
    async fn due_aging_profiles(&self, as_of: DateTime<Utc>) -> Result<Vec<AgingProfile>>;

    /// Total resident row count, used by `get_memory_stats`.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` on I/O failure.
    async fn count(&self) -> Result<u64>;
}
