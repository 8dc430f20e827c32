//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, pure helpers for vector serialization and similarity, and
//! the embedding cost estimate.
//!
//! Concrete providers (OpenAI, Ollama) live in the `neurashield` app crate.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Trait for embedding providers.
///
/// `embed` returns exactly one vector per input text, in input order, each
/// of length [`dims`](EmbeddingProvider::dims). Callers verify this and
/// treat a mismatch as a failed batch.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single text.
pub async fn embed_one(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let results = provider.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// Price in USD per million tokens for a model name.
pub fn price_per_million(model: &str) -> f64 {
    if model.contains("small") {
        0.02
    } else if model.contains("ada") {
        0.10
    } else {
        0.13
    }
}

/// Embedding cost estimate for a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub model: String,
    pub total_tokens: usize,
    pub cost_per_million_tokens: f64,
    pub estimated_cost_usd: f64,
}

impl CostEstimate {
    /// Cost formatted as dollars with four decimals, e.g. `$0.0012`.
    pub fn formatted_cost(&self) -> String {
        format!("${:.4}", self.estimated_cost_usd)
    }
}

/// Estimate the cost of embedding `total_tokens` tokens.
///
/// `override_price` replaces the per-model default when set.
pub fn estimate_cost(model: &str, total_tokens: usize, override_price: Option<f64>) -> CostEstimate {
    let price = override_price.unwrap_or_else(|| price_per_million(model));
    CostEstimate {
        model: model.to_string(),
        total_tokens,
        cost_per_million_tokens: price,
        estimated_cost_usd: total_tokens as f64 / 1_000_000.0 * price,
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use neurashield_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-norm vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
