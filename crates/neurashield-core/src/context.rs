//! Retrieval-augmented context assembly.
//!
//! [`ContextBuilder`] embeds a piece of query code, fetches the nearest
//! stored chunks from a [`VectorIndex`], and renders them into a text block
//! for prompt interpolation. Each call is independent; nothing is cached.
//!
//! When the index is empty the query is not embedded at all and the result
//! is an empty context, so analysis can proceed against a fresh index
//! without an embedding provider round-trip.

use anyhow::Result;
use serde::Serialize;

use crate::embedding::{embed_one, EmbeddingProvider};
use crate::models::SimilarPattern;
use crate::store::{MetadataFilter, VectorIndex};

/// Retrieved patterns plus their rendered form.
#[derive(Debug, Clone, Serialize)]
pub struct RagContext {
    pub query_code: String,
    pub retrieved_patterns: Vec<SimilarPattern>,
    pub formatted_context: String,
    pub analysis_type: String,
    pub num_patterns: usize,
}

impl RagContext {
    /// A context with no retrieved patterns.
    pub fn empty(query_code: &str, analysis_type: &str) -> Self {
        Self {
            query_code: query_code.to_string(),
            retrieved_patterns: Vec::new(),
            formatted_context: String::new(),
            analysis_type: analysis_type.to_string(),
            num_patterns: 0,
        }
    }
}

pub struct ContextBuilder<'a> {
    embedder: &'a dyn EmbeddingProvider,
    index: &'a dyn VectorIndex,
    top_k: usize,
    min_similarity: Option<f64>,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(embedder: &'a dyn EmbeddingProvider, index: &'a dyn VectorIndex, top_k: usize) -> Self {
        Self {
            embedder,
            index,
            top_k,
            min_similarity: None,
        }
    }

    /// Drop retrieved patterns whose similarity is below `threshold`.
    pub fn with_min_similarity(mut self, threshold: Option<f64>) -> Self {
        self.min_similarity = threshold;
        self
    }

    /// Fetch the patterns most similar to `query_code`, most similar first.
    pub async fn retrieve(
        &self,
        query_code: &str,
        top_k: Option<usize>,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SimilarPattern>> {
        let k = top_k.unwrap_or(self.top_k);
        if k == 0 || self.index.count().await? == 0 {
            return Ok(Vec::new());
        }

        let vector = embed_one(self.embedder, query_code).await?;
        let hits = self.index.query(&vector, k, filter).await?;

        let mut patterns: Vec<SimilarPattern> = hits
            .into_iter()
            .map(|hit| SimilarPattern {
                similarity_score: hit.similarity(),
                id: hit.id,
                code: hit.document,
                metadata: hit.metadata,
            })
            .filter(|p| self.min_similarity.map_or(true, |min| p.similarity_score >= min))
            .collect();
        patterns.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(patterns)
    }

    /// Retrieve and render the context for one analysis.
    pub async fn build(
        &self,
        query_code: &str,
        analysis_type: &str,
        top_k: Option<usize>,
        filter: Option<&MetadataFilter>,
    ) -> Result<RagContext> {
        let patterns = self.retrieve(query_code, top_k, filter).await?;
        Ok(RagContext {
            query_code: query_code.to_string(),
            formatted_context: format_context(&patterns),
            analysis_type: analysis_type.to_string(),
            num_patterns: patterns.len(),
            retrieved_patterns: patterns,
        })
    }
}

/// Render patterns as numbered Markdown sections, in the given order.
pub fn format_context(patterns: &[SimilarPattern]) -> String {
    patterns
        .iter()
        .enumerate()
        .map(|(i, pattern)| {
            let meta = &pattern.metadata;
            let field = |key: &str, default: &str| {
                meta.get(key)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| default.to_string())
            };
            let mut section = format!(
                "### Similar Pattern {} (Similarity: {:.2}%)\n",
                i + 1,
                pattern.similarity_score * 100.0
            );
            section.push_str(&format!("**File**: {}\n", field("file_path", "unknown")));
            section.push_str(&format!("**Type**: {}\n", field("type", "unknown")));
            section.push_str(&format!("**Name**: {}\n", field("name", "unknown")));
            section.push_str(&format!(
                "**Lines**: {}-{}\n",
                field("line_start", "0"),
                field("line_end", "0")
            ));
            if let Some(score) = meta.get("complexity_score") {
                section.push_str(&format!("**Complexity Score**: {}\n", score));
            }
            section.push_str(&format!("\n```python\n{}\n```\n", pattern.code));
            section
        })
        .collect::<Vec<_>>()
        .join("\n")
}
