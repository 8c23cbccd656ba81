//! Core data models used throughout docvault.
//!
//! These types represent the sources, chunks, and search results that flow
//! through the ingestion and retrieval pipeline.

use serde::Serialize;

/// One uploaded document and its metadata, owned by exactly one user.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub id: i64,
    pub owner_id: i64,
    /// Display name, usually the uploaded file name.
    pub name: String,
    /// Exact object-store key of the raw bytes.
    pub storage_key: String,
    /// Hex SHA-256 of the raw bytes; unique per owner.
    pub sha256: String,
    pub file_size: i64,
    pub mime_type: String,
    /// Unix epoch seconds.
    pub uploaded_at: i64,
}

/// A source row about to be inserted, before an id exists.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub owner_id: i64,
    pub name: String,
    pub storage_key: String,
    pub sha256: String,
    pub file_size: i64,
    pub mime_type: String,
    pub uploaded_at: i64,
}

/// A contiguous slice of a source's extracted text, produced by the chunker.
///
/// Offsets are character (not byte) positions into the trimmed source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub content: String,
    /// 0-based, contiguous, defines reading order.
    pub index: i64,
    pub char_start: i64,
    pub char_end: i64,
}

/// A fully-formed chunk row ready for insertion: segment plus its embedding.
///
/// Rows are written with content, offsets, and vector together; nothing is
/// backfilled after insert.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub content: String,
    pub embedding: Vec<f32>,
    pub chunk_index: i64,
    pub char_start: i64,
    pub char_end: i64,
    pub page: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

/// A stored chunk vector with enough context to build a search hit.
#[derive(Debug, Clone)]
pub struct ChunkVector {
    pub chunk_id: i64,
    pub content: String,
    pub source_name: String,
    pub storage_key: String,
    pub embedding: Vec<f32>,
}

/// A ranked result returned from similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: i64,
    pub content: String,
    pub source_name: String,
    /// Public retrieval URL of the source's stored bytes.
    pub source_ref: String,
    pub score: f64,
}

/// Outcome of a successful ingestion.
///
/// Carries the chunk count so callers can distinguish "ingested with N
/// chunks" from failure.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct IngestReceipt {
    pub source_id: i64,
    pub chunk_count: usize,
}
