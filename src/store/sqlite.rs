//! SQLite-backed [`Store`] implementation.
//!
//! Vectors are stored as little-endian `f32` BLOBs and scored in Rust at
//! query time; `(owner_id, sha256)` uniqueness is enforced by the schema's
//! unique index (see [`crate::migrate`]).

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::PipelineError;
use crate::models::{ChunkRecord, ChunkVector, NewSource, Source};

use super::Store;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_insert_error(e: sqlx::Error) -> PipelineError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return PipelineError::DuplicateSource;
        }
    }
    PipelineError::PersistenceFailure(e)
}

fn row_to_source(row: &sqlx::sqlite::SqliteRow) -> Source {
    Source {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        name: row.get("name"),
        storage_key: row.get("storage_key"),
        sha256: row.get("sha256"),
        file_size: row.get("file_size"),
        mime_type: row.get("mime_type"),
        uploaded_at: row.get("uploaded_at"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn find_source_by_hash(
        &self,
        owner_id: i64,
        sha256: &str,
    ) -> Result<Option<i64>, PipelineError> {
        let id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM sources WHERE owner_id = ? AND sha256 = ?")
                .bind(owner_id)
                .bind(sha256)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id)
    }

    async fn insert_source_with_chunks(
        &self,
        source: &NewSource,
        chunks: &[ChunkRecord],
    ) -> Result<i64, PipelineError> {
        let mut tx = self.pool.begin().await?;

        let source_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sources (owner_id, name, storage_key, sha256, file_size, mime_type, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(source.owner_id)
        .bind(&source.name)
        .bind(&source.storage_key)
        .bind(&source.sha256)
        .bind(source.file_size)
        .bind(&source.mime_type)
        .bind(source.uploaded_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        for chunk in chunks {
            let metadata = chunk.metadata.as_ref().map(|m| m.to_string());
            sqlx::query(
                r#"
                INSERT INTO chunks (source_id, content, embedding, chunk_index, char_start, char_end, page, metadata)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(source_id)
            .bind(&chunk.content)
            .bind(vec_to_blob(&chunk.embedding))
            .bind(chunk.chunk_index)
            .bind(chunk.char_start)
            .bind(chunk.char_end)
            .bind(chunk.page)
            .bind(metadata)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(source_id)
    }

    async fn list_sources(&self, owner_id: i64) -> Result<Vec<Source>, PipelineError> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, name, storage_key, sha256, file_size, mime_type, uploaded_at
            FROM sources
            WHERE owner_id = ?
            ORDER BY uploaded_at DESC, id DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_source).collect())
    }

    async fn count_chunks(&self, source_id: i64) -> Result<i64, PipelineError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE source_id = ?")
            .bind(source_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn delete_source(
        &self,
        owner_id: i64,
        source_id: i64,
    ) -> Result<Option<String>, PipelineError> {
        let mut tx = self.pool.begin().await?;

        let storage_key: Option<String> =
            sqlx::query_scalar("SELECT storage_key FROM sources WHERE id = ? AND owner_id = ?")
                .bind(source_id)
                .bind(owner_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(storage_key) = storage_key else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(storage_key))
    }

    async fn chunk_vectors(&self) -> Result<Vec<ChunkVector>, PipelineError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.content, c.embedding, s.name, s.storage_key
            FROM chunks c
            JOIN sources s ON s.id = c.source_id
            ORDER BY c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ChunkVector {
                    chunk_id: row.get("id"),
                    content: row.get("content"),
                    source_name: row.get("name"),
                    storage_key: row.get("storage_key"),
                    embedding: blob_to_vec(&blob),
                }
            })
            .collect())
    }

    async fn record_orphaned_blob(&self, storage_key: &str) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO orphaned_blobs (storage_key, recorded_at) VALUES (?, ?)
            ON CONFLICT(storage_key) DO NOTHING
            "#,
        )
        .bind(storage_key)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn orphaned_blobs(&self) -> Result<Vec<String>, PipelineError> {
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT storage_key FROM orphaned_blobs ORDER BY recorded_at, storage_key",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    async fn remove_orphaned_blob(&self, storage_key: &str) -> Result<(), PipelineError> {
        sqlx::query("DELETE FROM orphaned_blobs WHERE storage_key = ?")
            .bind(storage_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
