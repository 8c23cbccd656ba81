use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Idempotent — safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Sources: one row per successful upload
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            storage_key TEXT NOT NULL,
            sha256 TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            mime_type TEXT NOT NULL,
            uploaded_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Re-uploading identical bytes for the same owner must lose here;
    // the pipeline's pre-check is only an optimization.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_sources_owner_sha256 ON sources(owner_id, sha256)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sources_owner_uploaded ON sources(owner_id, uploaded_at DESC)",
    )
    .execute(pool)
    .await?;

    // Chunks: fully-formed rows (content + embedding + offsets together)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id INTEGER NOT NULL,
            content TEXT NOT NULL,
            embedding BLOB NOT NULL,
            chunk_index INTEGER NOT NULL,
            char_start INTEGER NOT NULL,
            char_end INTEGER NOT NULL,
            page INTEGER,
            metadata TEXT,
            UNIQUE(source_id, chunk_index),
            FOREIGN KEY (source_id) REFERENCES sources(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunks_source_chunk ON chunks(source_id, chunk_index)",
    )
    .execute(pool)
    .await?;

    // Ledger of blob deletes that failed after their rows were removed
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orphaned_blobs (
            storage_key TEXT PRIMARY KEY,
            recorded_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
