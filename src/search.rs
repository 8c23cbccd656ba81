//! Vector similarity search over stored chunks.
//!
//! The query is embedded with the same model used at ingestion time, every
//! stored chunk is scored by cosine similarity (`1 − cosine distance`), and
//! hits above the threshold come back in descending score order, ties
//! broken by ascending chunk id, truncated to the limit. An empty result is
//! a normal outcome, not an error.
//!
//! [`knowledge_base_lookup`] is the chat-tool entry point: it formats the
//! top hits as numbered excerpts and degrades to "no results" instead of
//! failing the conversation turn when search errors.

use serde::Serialize;
use tracing::warn;

use crate::embedding::{cosine_similarity, embed_query};
use crate::error::PipelineError;
use crate::ingest::Pipeline;
use crate::models::SearchHit;

/// How many hits the chat tool requests.
pub const TOOL_RESULT_LIMIT: usize = 3;
/// Minimum similarity the chat tool accepts.
pub const TOOL_SCORE_THRESHOLD: f64 = 0.5;

impl Pipeline {
    /// Rank stored chunks against `query`.
    ///
    /// `threshold` must lie in `[0, 1]`; scores must strictly exceed it to
    /// be returned. A whitespace-only query matches nothing. A dimension
    /// mismatch between the query vector and any stored vector is a
    /// deployment problem (the corpus was embedded with a different model)
    /// and surfaces as [`PipelineError::ConfigurationError`].
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<SearchHit>, PipelineError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PipelineError::ConfigurationError(format!(
                "search threshold {} outside [0, 1]",
                threshold
            )));
        }
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = embed_query(self.embedder.as_ref(), query).await?;

        let candidates = self.store.chunk_vectors().await?;
        let mut scored = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            if candidate.embedding.len() != query_vec.len() {
                return Err(PipelineError::ConfigurationError(format!(
                    "stored vector for chunk {} has {} dimensions, query has {}",
                    candidate.chunk_id,
                    candidate.embedding.len(),
                    query_vec.len()
                )));
            }
            let score = cosine_similarity(&query_vec, &candidate.embedding) as f64;
            scored.push(Scored { candidate, score });
        }

        Ok(rank(scored, limit, threshold)
            .into_iter()
            .map(|s| SearchHit {
                chunk_id: s.candidate.chunk_id,
                content: s.candidate.content,
                source_name: s.candidate.source_name,
                source_ref: self.objects.public_url(&s.candidate.storage_key),
                score: s.score,
            })
            .collect())
    }
}

struct Scored {
    candidate: crate::models::ChunkVector,
    score: f64,
}

/// Threshold filter, descending-score sort with chunk-id tie-break, limit.
fn rank(mut scored: Vec<Scored>, limit: usize, threshold: f64) -> Vec<Scored> {
    scored.retain(|s| s.score > threshold);
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.candidate.chunk_id.cmp(&b.candidate.chunk_id))
    });
    scored.truncate(limit);
    scored
}

/// One source citation in a [`ToolResponse`].
#[derive(Debug, Clone, Serialize)]
pub struct ToolSource {
    pub title: String,
    pub url: String,
    pub source_id: String,
}

/// What the chat tool hands back to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub content: String,
    pub sources: Vec<ToolSource>,
}

const NO_RESULTS: &str = "No relevant documents found.";

/// Knowledge-base lookup for the chat tool.
///
/// Never fails: a search error is logged and reported to the model as an
/// empty result so the conversation turn survives.
pub async fn knowledge_base_lookup(pipeline: &Pipeline, query: &str) -> ToolResponse {
    match pipeline
        .search(query, TOOL_RESULT_LIMIT, TOOL_SCORE_THRESHOLD)
        .await
    {
        Ok(hits) if !hits.is_empty() => {
            let sources = hits
                .iter()
                .map(|hit| ToolSource {
                    title: hit.source_name.clone(),
                    url: hit.source_ref.clone(),
                    source_id: hit.chunk_id.to_string(),
                })
                .collect();
            let content = hits
                .iter()
                .enumerate()
                .map(|(i, hit)| format!("[{}] {}", i + 1, hit.content))
                .collect::<Vec<_>>()
                .join("\n\n");
            ToolResponse { content, sources }
        }
        Ok(_) => ToolResponse {
            content: NO_RESULTS.to_string(),
            sources: Vec::new(),
        },
        Err(e) => {
            warn!(error = %e, "knowledge base search failed");
            ToolResponse {
                content: NO_RESULTS.to_string(),
                sources: Vec::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkVector;

    fn scored(chunk_id: i64, score: f64) -> Scored {
        Scored {
            candidate: ChunkVector {
                chunk_id,
                content: String::new(),
                source_name: String::new(),
                storage_key: String::new(),
                embedding: Vec::new(),
            },
            score,
        }
    }

    fn ids(ranked: &[Scored]) -> Vec<i64> {
        ranked.iter().map(|s| s.candidate.chunk_id).collect()
    }

    #[test]
    fn orders_by_descending_score() {
        let ranked = rank(vec![scored(1, 0.2), scored(2, 0.9), scored(3, 0.5)], 10, 0.0);
        assert_eq!(ids(&ranked), vec![2, 3, 1]);
    }

    #[test]
    fn threshold_is_exclusive() {
        let ranked = rank(vec![scored(1, 0.5), scored(2, 0.51)], 10, 0.5);
        assert_eq!(ids(&ranked), vec![2]);
    }

    #[test]
    fn truncates_to_limit() {
        let ranked = rank(
            vec![scored(1, 0.9), scored(2, 0.8), scored(3, 0.7)],
            2,
            0.0,
        );
        assert_eq!(ids(&ranked), vec![1, 2]);
    }

    #[test]
    fn ties_break_by_lower_chunk_id() {
        let ranked = rank(vec![scored(7, 0.8), scored(3, 0.8), scored(5, 0.8)], 10, 0.0);
        assert_eq!(ids(&ranked), vec![3, 5, 7]);
    }

    #[test]
    fn nothing_above_threshold_is_empty_not_error() {
        let ranked = rank(vec![scored(1, 0.4), scored(2, 0.1)], 10, 0.99);
        assert!(ranked.is_empty());
    }
}
