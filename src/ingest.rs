//! Ingestion pipeline orchestration.
//!
//! [`Pipeline`] coordinates the full upload flow: extraction → dedup check →
//! blob storage → chunking → embedding → atomic persistence. It owns the
//! injected collaborators (store, object store, embedder); nothing here is
//! an ambient singleton, so a process constructs its pipeline once at
//! startup and drops it at shutdown.
//!
//! Each call runs to completion inside the request that made it; there are
//! no background workers. Failure ordering is arranged so the database never
//! holds partial state: the source row and its chunk rows land in one
//! transaction, after embedding has already succeeded. The raw bytes are
//! stored first and compensated with a delete — falling back to the
//! orphaned-blob ledger — when a later step fails. A dangling blob is a
//! resource leak; a dangling chunk row would be a correctness hazard.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::chunk::chunk_text;
use crate::config::ChunkingConfig;
use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::extract::extract_text;
use crate::models::{ChunkRecord, IngestReceipt, NewSource, Source};
use crate::object_store::{object_key, ObjectStore};
use crate::store::Store;

/// The ingestion and retrieval pipeline with its injected collaborators.
pub struct Pipeline {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) objects: Arc<dyn ObjectStore>,
    pub(crate) embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn Store>,
        objects: Arc<dyn ObjectStore>,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            store,
            objects,
            embedder,
            chunking,
        }
    }

    /// Ingest one uploaded document for `owner_id`.
    ///
    /// Re-invoking after a failure is safe: the dedup check makes
    /// re-ingestion of already-stored content fail with
    /// [`PipelineError::DuplicateSource`] instead of writing twice.
    pub async fn ingest(
        &self,
        owner_id: i64,
        raw_bytes: &[u8],
        file_name: &str,
        mime_type: &str,
    ) -> Result<IngestReceipt, PipelineError> {
        let text = extract_text(raw_bytes, mime_type)?;
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyDocument);
        }

        let sha256 = hex_sha256(raw_bytes);

        // Pre-check so a duplicate costs no storage write and no embedding
        // call. The unique index on (owner_id, sha256) is the actual
        // serialization point; a concurrent loser surfaces DuplicateSource
        // from the insert below.
        if self
            .store
            .find_source_by_hash(owner_id, &sha256)
            .await?
            .is_some()
        {
            return Err(PipelineError::DuplicateSource);
        }

        let storage_key = object_key(owner_id, file_name);
        self.objects.put(&storage_key, raw_bytes, mime_type).await?;

        match self
            .persist(owner_id, raw_bytes, file_name, mime_type, &sha256, &storage_key, &text)
            .await
        {
            Ok(receipt) => {
                info!(
                    owner_id,
                    source_id = receipt.source_id,
                    chunk_count = receipt.chunk_count,
                    "source ingested"
                );
                Ok(receipt)
            }
            Err(e) => {
                self.release_blob(&storage_key).await;
                Err(e)
            }
        }
    }

    /// Chunk, embed, and write the source with its chunks in one
    /// transaction. The blob at `storage_key` already exists; the caller
    /// compensates if this fails.
    #[allow(clippy::too_many_arguments)]
    async fn persist(
        &self,
        owner_id: i64,
        raw_bytes: &[u8],
        file_name: &str,
        mime_type: &str,
        sha256: &str,
        storage_key: &str,
        text: &str,
    ) -> Result<IngestReceipt, PipelineError> {
        let segments = chunk_text(text, self.chunking.chunk_size, self.chunking.overlap);

        let texts: Vec<String> = segments.iter().map(|s| s.content.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != segments.len() {
            return Err(PipelineError::EmbeddingFailure(format!(
                "{} vectors returned for {} segments",
                vectors.len(),
                segments.len()
            )));
        }

        let chunks: Vec<ChunkRecord> = segments
            .into_iter()
            .zip(vectors)
            .map(|(segment, embedding)| ChunkRecord {
                content: segment.content,
                embedding,
                chunk_index: segment.index,
                char_start: segment.char_start,
                char_end: segment.char_end,
                page: None,
                metadata: None,
            })
            .collect();

        let source = NewSource {
            owner_id,
            name: file_name.to_string(),
            storage_key: storage_key.to_string(),
            sha256: sha256.to_string(),
            file_size: raw_bytes.len() as i64,
            mime_type: mime_type.to_string(),
            uploaded_at: chrono::Utc::now().timestamp(),
        };

        let source_id = self.store.insert_source_with_chunks(&source, &chunks).await?;

        Ok(IngestReceipt {
            source_id,
            chunk_count: chunks.len(),
        })
    }

    /// All sources owned by `owner_id`, most recently uploaded first.
    pub async fn list_sources(&self, owner_id: i64) -> Result<Vec<Source>, PipelineError> {
        self.store.list_sources(owner_id).await
    }

    /// Delete a source: its chunks and row go in one transaction, then the
    /// stored bytes. Once this returns, readers see neither the source nor
    /// its chunks; a failed blob delete is recorded for
    /// [`reconcile_blobs`](Self::reconcile_blobs).
    pub async fn delete_source(
        &self,
        owner_id: i64,
        source_id: i64,
    ) -> Result<(), PipelineError> {
        let storage_key = self
            .store
            .delete_source(owner_id, source_id)
            .await?
            .ok_or(PipelineError::SourceNotFound)?;

        info!(owner_id, source_id, "source deleted");
        self.release_blob(&storage_key).await;
        Ok(())
    }

    /// Retry blob deletes that failed earlier. Returns how many ledger
    /// entries were cleared.
    pub async fn reconcile_blobs(&self) -> Result<usize, PipelineError> {
        let keys = self.store.orphaned_blobs().await?;
        let mut cleared = 0usize;

        for key in keys {
            match self.objects.delete(&key).await {
                Ok(()) => {
                    self.store.remove_orphaned_blob(&key).await?;
                    cleared += 1;
                }
                Err(e) => {
                    warn!(storage_key = %key, error = %e, "orphaned blob still undeletable");
                }
            }
        }

        Ok(cleared)
    }

    /// Best-effort blob delete with ledger fallback; never fails the
    /// surrounding operation.
    async fn release_blob(&self, storage_key: &str) {
        if let Err(e) = self.objects.delete(storage_key).await {
            warn!(%storage_key, error = %e, "blob delete failed; recording for reconciliation");
            if let Err(e) = self.store.record_orphaned_blob(storage_key).await {
                warn!(%storage_key, error = %e, "could not record orphaned blob");
            }
        }
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
