//! Storage abstraction for sources and chunks.
//!
//! The [`Store`] trait defines the relational operations the pipeline and
//! search need, enabling pluggable backends (SQLite, in-memory for tests).
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! Two invariants live at this layer:
//! - `(owner_id, sha256)` is unique across sources; a violated insert
//!   surfaces [`PipelineError::DuplicateSource`]. The constraint — not the
//!   pipeline's pre-check — is what serializes concurrent ingests of the
//!   same bytes.
//! - A source row and its chunk rows are written in one transaction, and
//!   deleted in one transaction, so readers never observe a source without
//!   its chunks or a half-written chunk batch.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::models::{ChunkRecord, ChunkVector, NewSource, Source};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Relational backend for sources, chunks, and the orphaned-blob ledger.
#[async_trait]
pub trait Store: Send + Sync {
    /// Look up a source id by content hash (dedup pre-check).
    async fn find_source_by_hash(
        &self,
        owner_id: i64,
        sha256: &str,
    ) -> Result<Option<i64>, PipelineError>;

    /// Insert a source row and all of its chunk rows atomically.
    ///
    /// Returns the new source id, or [`PipelineError::DuplicateSource`]
    /// when `(owner_id, sha256)` already exists.
    async fn insert_source_with_chunks(
        &self,
        source: &NewSource,
        chunks: &[ChunkRecord],
    ) -> Result<i64, PipelineError>;

    /// All sources owned by `owner_id`, most recently uploaded first.
    async fn list_sources(&self, owner_id: i64) -> Result<Vec<Source>, PipelineError>;

    /// Count the chunks belonging to a source.
    async fn count_chunks(&self, source_id: i64) -> Result<i64, PipelineError>;

    /// Delete a source and its chunks atomically, ownership-checked.
    ///
    /// Returns the removed source's storage key so the caller can delete
    /// the stored bytes, or `None` when no such source exists for this
    /// owner.
    async fn delete_source(
        &self,
        owner_id: i64,
        source_id: i64,
    ) -> Result<Option<String>, PipelineError>;

    /// Every stored chunk vector with its search-hit context, in chunk-id
    /// order.
    async fn chunk_vectors(&self) -> Result<Vec<ChunkVector>, PipelineError>;

    /// Record a blob whose delete failed after its rows were removed.
    async fn record_orphaned_blob(&self, storage_key: &str) -> Result<(), PipelineError>;

    /// Storage keys awaiting reconciliation, oldest first.
    async fn orphaned_blobs(&self) -> Result<Vec<String>, PipelineError>;

    /// Clear a ledger entry after its blob was deleted.
    async fn remove_orphaned_blob(&self, storage_key: &str) -> Result<(), PipelineError>;
}
