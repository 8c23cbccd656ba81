//! SQLite store tests over a scratch database file.
//!
//! Exercises the schema-level invariants the pipeline relies on: the
//! `(owner_id, sha256)` unique index, transactional source+chunk writes,
//! ownership-checked deletes, and the orphaned-blob ledger.

use tempfile::TempDir;

use docvault::db;
use docvault::error::PipelineError;
use docvault::migrate::run_migrations;
use docvault::models::{ChunkRecord, NewSource};
use docvault::store::{SqliteStore, Store};

async fn open_store(tmp: &TempDir) -> SqliteStore {
    let pool = db::connect(&tmp.path().join("data").join("dv.sqlite"))
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    SqliteStore::new(pool)
}

fn source(owner_id: i64, sha256: &str) -> NewSource {
    NewSource {
        owner_id,
        name: "cours.pdf".to_string(),
        storage_key: format!("{}/abc-cours.pdf", owner_id),
        sha256: sha256.to_string(),
        file_size: 1024,
        mime_type: "application/pdf".to_string(),
        uploaded_at: 1_700_000_000,
    }
}

fn chunk(index: i64, content: &str, embedding: Vec<f32>) -> ChunkRecord {
    ChunkRecord {
        content: content.to_string(),
        embedding,
        chunk_index: index,
        char_start: index * 800,
        char_end: index * 800 + 1000,
        page: None,
        metadata: None,
    }
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect(&tmp.path().join("dv.sqlite")).await.unwrap();
    run_migrations(&pool).await.unwrap();
    run_migrations(&pool).await.unwrap();
}

#[tokio::test]
async fn insert_then_find_by_hash_and_list() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let id = store
        .insert_source_with_chunks(
            &source(1, "hash-a"),
            &[chunk(0, "first", vec![1.0, 0.0]), chunk(1, "second", vec![0.0, 1.0])],
        )
        .await
        .unwrap();

    assert_eq!(store.find_source_by_hash(1, "hash-a").await.unwrap(), Some(id));
    assert_eq!(store.find_source_by_hash(1, "hash-b").await.unwrap(), None);
    assert_eq!(store.find_source_by_hash(2, "hash-a").await.unwrap(), None);
    assert_eq!(store.count_chunks(id).await.unwrap(), 2);

    let sources = store.list_sources(1).await.unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].id, id);
    assert_eq!(sources[0].sha256, "hash-a");
    assert_eq!(sources[0].mime_type, "application/pdf");
}

#[tokio::test]
async fn unique_index_rejects_same_owner_and_hash() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store
        .insert_source_with_chunks(&source(1, "hash-a"), &[chunk(0, "one", vec![1.0])])
        .await
        .unwrap();

    let err = store
        .insert_source_with_chunks(&source(1, "hash-a"), &[chunk(0, "one", vec![1.0])])
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::DuplicateSource));

    // The failed transaction left no chunk rows behind.
    assert_eq!(store.chunk_vectors().await.unwrap().len(), 1);

    // Same hash under another owner is fine.
    store
        .insert_source_with_chunks(&source(2, "hash-a"), &[chunk(0, "one", vec![1.0])])
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_is_transactional_and_ownership_checked() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let id = store
        .insert_source_with_chunks(
            &source(1, "hash-a"),
            &[chunk(0, "one", vec![1.0]), chunk(1, "two", vec![2.0])],
        )
        .await
        .unwrap();

    // Wrong owner: nothing happens.
    assert_eq!(store.delete_source(2, id).await.unwrap(), None);
    assert_eq!(store.count_chunks(id).await.unwrap(), 2);

    let key = store.delete_source(1, id).await.unwrap().unwrap();
    assert_eq!(key, "1/abc-cours.pdf");
    assert_eq!(store.count_chunks(id).await.unwrap(), 0);
    assert!(store.list_sources(1).await.unwrap().is_empty());
    assert_eq!(store.find_source_by_hash(1, "hash-a").await.unwrap(), None);

    // Already gone.
    assert_eq!(store.delete_source(1, id).await.unwrap(), None);
}

#[tokio::test]
async fn chunk_vectors_round_trip_in_id_order() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store
        .insert_source_with_chunks(
            &source(1, "hash-a"),
            &[
                chunk(0, "alpha", vec![1.0, -2.5, 3.125]),
                chunk(1, "beta", vec![0.5, 0.25, -0.125]),
            ],
        )
        .await
        .unwrap();

    let vectors = store.chunk_vectors().await.unwrap();
    assert_eq!(vectors.len(), 2);
    assert!(vectors[0].chunk_id < vectors[1].chunk_id);
    assert_eq!(vectors[0].content, "alpha");
    assert_eq!(vectors[0].embedding, vec![1.0, -2.5, 3.125]);
    assert_eq!(vectors[1].embedding, vec![0.5, 0.25, -0.125]);
    assert_eq!(vectors[0].source_name, "cours.pdf");
    assert_eq!(vectors[0].storage_key, "1/abc-cours.pdf");
}

#[tokio::test]
async fn orphan_ledger_records_once_and_clears() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store.record_orphaned_blob("1/k-a.pdf").await.unwrap();
    store.record_orphaned_blob("1/k-a.pdf").await.unwrap();
    store.record_orphaned_blob("1/k-b.pdf").await.unwrap();

    let keys = store.orphaned_blobs().await.unwrap();
    assert_eq!(keys.len(), 2);
    assert!(keys.contains(&"1/k-a.pdf".to_string()));

    store.remove_orphaned_blob("1/k-a.pdf").await.unwrap();
    assert_eq!(store.orphaned_blobs().await.unwrap(), vec!["1/k-b.pdf"]);
}
