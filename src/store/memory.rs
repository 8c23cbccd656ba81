//! In-memory [`Store`] implementation for tests.
//!
//! A single `RwLock` over the whole state makes each operation atomic, so
//! the concurrent-ingest race resolves here exactly as the SQLite unique
//! index resolves it: one winner, one [`PipelineError::DuplicateSource`].

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::models::{ChunkRecord, ChunkVector, NewSource, Source};

use super::Store;

struct StoredChunk {
    id: i64,
    source_id: i64,
    record: ChunkRecord,
}

#[derive(Default)]
struct Inner {
    next_source_id: i64,
    next_chunk_id: i64,
    sources: Vec<Source>,
    chunks: Vec<StoredChunk>,
    orphans: Vec<String>,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_source_by_hash(
        &self,
        owner_id: i64,
        sha256: &str,
    ) -> Result<Option<i64>, PipelineError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .sources
            .iter()
            .find(|s| s.owner_id == owner_id && s.sha256 == sha256)
            .map(|s| s.id))
    }

    async fn insert_source_with_chunks(
        &self,
        source: &NewSource,
        chunks: &[ChunkRecord],
    ) -> Result<i64, PipelineError> {
        let mut inner = self.inner.write().unwrap();

        if inner
            .sources
            .iter()
            .any(|s| s.owner_id == source.owner_id && s.sha256 == source.sha256)
        {
            return Err(PipelineError::DuplicateSource);
        }

        inner.next_source_id += 1;
        let source_id = inner.next_source_id;
        inner.sources.push(Source {
            id: source_id,
            owner_id: source.owner_id,
            name: source.name.clone(),
            storage_key: source.storage_key.clone(),
            sha256: source.sha256.clone(),
            file_size: source.file_size,
            mime_type: source.mime_type.clone(),
            uploaded_at: source.uploaded_at,
        });

        for chunk in chunks {
            inner.next_chunk_id += 1;
            let id = inner.next_chunk_id;
            inner.chunks.push(StoredChunk {
                id,
                source_id,
                record: chunk.clone(),
            });
        }

        Ok(source_id)
    }

    async fn list_sources(&self, owner_id: i64) -> Result<Vec<Source>, PipelineError> {
        let inner = self.inner.read().unwrap();
        let mut sources: Vec<Source> = inner
            .sources
            .iter()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect();
        sources.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then(b.id.cmp(&a.id)));
        Ok(sources)
    }

    async fn count_chunks(&self, source_id: i64) -> Result<i64, PipelineError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .chunks
            .iter()
            .filter(|c| c.source_id == source_id)
            .count() as i64)
    }

    async fn delete_source(
        &self,
        owner_id: i64,
        source_id: i64,
    ) -> Result<Option<String>, PipelineError> {
        let mut inner = self.inner.write().unwrap();

        let Some(position) = inner
            .sources
            .iter()
            .position(|s| s.id == source_id && s.owner_id == owner_id)
        else {
            return Ok(None);
        };

        let source = inner.sources.remove(position);
        inner.chunks.retain(|c| c.source_id != source_id);
        Ok(Some(source.storage_key))
    }

    async fn chunk_vectors(&self) -> Result<Vec<ChunkVector>, PipelineError> {
        let inner = self.inner.read().unwrap();
        let mut vectors: Vec<ChunkVector> = inner
            .chunks
            .iter()
            .map(|c| {
                let source = inner
                    .sources
                    .iter()
                    .find(|s| s.id == c.source_id)
                    .expect("chunk without source");
                ChunkVector {
                    chunk_id: c.id,
                    content: c.record.content.clone(),
                    source_name: source.name.clone(),
                    storage_key: source.storage_key.clone(),
                    embedding: c.record.embedding.clone(),
                }
            })
            .collect();
        vectors.sort_by_key(|v| v.chunk_id);
        Ok(vectors)
    }

    async fn record_orphaned_blob(&self, storage_key: &str) -> Result<(), PipelineError> {
        let mut inner = self.inner.write().unwrap();
        if !inner.orphans.iter().any(|k| k == storage_key) {
            inner.orphans.push(storage_key.to_string());
        }
        Ok(())
    }

    async fn orphaned_blobs(&self) -> Result<Vec<String>, PipelineError> {
        Ok(self.inner.read().unwrap().orphans.clone())
    }

    async fn remove_orphaned_blob(&self, storage_key: &str) -> Result<(), PipelineError> {
        self.inner
            .write()
            .unwrap()
            .orphans
            .retain(|k| k != storage_key);
        Ok(())
    }
}
