//! Error taxonomy for the ingestion and retrieval pipeline.
//!
//! Every fallible pipeline operation returns one of these variants so that
//! callers can show a distinct, actionable message per failure kind instead
//! of one generic error. Nothing in this crate converts a failure into a
//! silent success; the single place errors are downgraded is the chat-tool
//! wrapper in [`crate::search::knowledge_base_lookup`].

use thiserror::Error;

/// Typed failures surfaced by ingestion, deletion, and search.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The document yielded no extractable text after trimming.
    #[error("the document contains no extractable text")]
    EmptyDocument,

    /// The same bytes were already ingested by this owner.
    #[error("this file was already imported")]
    DuplicateSource,

    /// Text extraction failed (corrupt file, unsupported content type).
    #[error("text extraction failed: {0}")]
    ExtractionFailure(String),

    /// An object-store request failed or timed out.
    #[error("object storage request failed: {0}")]
    StorageFailure(String),

    /// The embedding provider failed after retries, or returned a
    /// malformed response.
    #[error("embedding request failed: {0}")]
    EmbeddingFailure(String),

    /// A database read or write failed.
    #[error("database operation failed: {0}")]
    PersistenceFailure(#[from] sqlx::Error),

    /// The deployment is misconfigured (e.g. embedding dimension mismatch
    /// between the query model and the stored vectors).
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// The source does not exist or belongs to another owner.
    #[error("source not found")]
    SourceNotFound,
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
