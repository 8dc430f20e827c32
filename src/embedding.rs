//! HTTP embedding providers and batched chunk embedding.
//!
//! Implements [`EmbeddingProvider`] for:
//! - **[`OpenAIProvider`]**: `POST {url}/embeddings` with bearer auth.
//! - **[`OllamaProvider`]**: `POST {url}/api/embed` on a local Ollama.
//! - **[`DisabledProvider`]**: always errors; used when embeddings are off.
//!
//! [`embed_chunks`] drives a provider over a chunk list in fixed-size
//! batches with a delay between batches. A batch that fails (transport
//! error, wrong vector count, wrong dimensionality) is dropped whole and
//! reported as [`BatchOutcome::Dropped`]; its chunks never reach the index.
//!
//! # Retry Strategy
//!
//! `max_retries` defaults to 0. When raised:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use neurashield_core::embedding::EmbeddingProvider;
use neurashield_core::models::Chunk;

use crate::config::EmbeddingConfig;
use crate::progress::{IngestEvent, ProgressReporter};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

// ============ Shared HTTP ============

/// POST built by `build`, retrying transient failures up to `max_retries`
/// times, and return the JSON body of the first success.
pub(crate) async fn post_json_with_retry<F>(
    label: &str,
    max_retries: u32,
    build: F,
) -> Result<serde_json::Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(attempt, delay_secs = delay.as_secs(), "{} retry", label);
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("{} returned invalid JSON", label));
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow!("{} error {}: {}", label, status, body_text));
                    continue;
                }

                bail!("{} error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} request failed: {}", label, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} failed after retries", label)))
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Read a credential from the environment, failing fast when unset.
pub(crate) fn api_key_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!("{} environment variable not set", var),
    }
}

// ============ Disabled Provider ============

pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI Provider ============

/// Embedding provider for the OpenAI embeddings API (or any compatible
/// endpoint set through `embedding.url`).
pub struct OpenAIProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAIProvider {
    /// Build from config, reading the API key from `embedding.api_key_env`.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = api_key_from_env(&config.api_key_env)?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: config.model.clone(),
            dims: config.resolved_dims(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_json_with_retry("OpenAI embeddings", self.max_retries, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        indexed.push((index, to_f32_vec(embedding)));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

// ============ Ollama Provider ============

/// Embedding provider for a local Ollama instance.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            dims: config.resolved_dims(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_json_with_retry("Ollama embeddings", self.max_retries, || {
            self.client.post(&url).json(&body)
        })
        .await
        .with_context(|| format!("is Ollama running at {}?", self.base_url))?;

        let embeddings = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;
        embeddings
            .iter()
            .map(|e| {
                e.as_array()
                    .map(|values| to_f32_vec(values))
                    .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))
            })
            .collect()
    }
}

/// Create the provider named by `embedding.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"disabled"` | [`DisabledProvider`] |
///
/// Fails fast when the OpenAI credential is missing.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Batched embedding ============

/// Result of one embedding batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Embedded { batch: usize, count: usize },
    Dropped { batch: usize, size: usize, reason: String },
}

impl BatchOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, BatchOutcome::Dropped { .. })
    }
}

/// Embed `chunks` in batches of `batch_size`, sleeping `delay` between
/// batches. Returns the chunks that received an embedding, in input
/// order, plus one outcome per batch.
pub async fn embed_chunks(
    provider: &dyn EmbeddingProvider,
    chunks: Vec<Chunk>,
    batch_size: usize,
    delay: Duration,
    progress: &dyn ProgressReporter,
) -> (Vec<Chunk>, Vec<BatchOutcome>) {
    let batch_size = batch_size.max(1);
    let total = chunks.len().div_ceil(batch_size);
    let mut embedded = Vec::with_capacity(chunks.len());
    let mut outcomes = Vec::with_capacity(total);

    let mut pending = chunks.into_iter().peekable();
    let mut batch_no = 0;
    while pending.peek().is_some() {
        if batch_no > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        batch_no += 1;
        progress.report(IngestEvent::Embedding {
            batch: batch_no as u64,
            total: total as u64,
        });

        let mut batch: Vec<Chunk> = pending.by_ref().take(batch_size).collect();
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        match embed_batch(provider, &texts).await {
            Ok(vectors) => {
                for (chunk, vector) in batch.iter_mut().zip(vectors) {
                    chunk.embedding = Some(vector);
                }
                outcomes.push(BatchOutcome::Embedded {
                    batch: batch_no,
                    count: batch.len(),
                });
                embedded.extend(batch);
            }
            Err(err) => {
                let reason = format!("{:#}", err);
                warn!(batch = batch_no, size = batch.len(), error = %reason, "dropped embedding batch");
                outcomes.push(BatchOutcome::Dropped {
                    batch: batch_no,
                    size: batch.len(),
                    reason,
                });
            }
        }
    }

    (embedded, outcomes)
}

/// One provider call, checked for count and dimensionality.
async fn embed_batch(provider: &dyn EmbeddingProvider, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let vectors = provider.embed(texts).await?;
    if vectors.len() != texts.len() {
        bail!(
            "provider returned {} vectors for {} inputs",
            vectors.len(),
            texts.len()
        );
    }
    let dims = provider.dims();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        bail!(
            "provider returned a {}-dimensional vector, expected {}",
            bad.len(),
            dims
        );
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use neurashield_core::models::ChunkKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every call whose batch contains the text "boom".
    struct Flaky {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for Flaky {
        fn model_name(&self) -> &str {
            "flaky"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if texts.iter().any(|t| t == "boom") {
                bail!("simulated outage");
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn chunk(text: &str) -> Chunk {
        Chunk {
            id: text.to_string(),
            file_path: "a.py".into(),
            kind: ChunkKind::Function,
            name: text.to_string(),
            class_name: None,
            is_async: false,
            part: None,
            truncated: false,
            line_start: 1,
            line_end: 1,
            token_count: 1,
            text: text.to_string(),
            embedding: None,
            file_metadata: None,
            language: "python".into(),
        }
    }

    #[tokio::test]
    async fn failed_batch_is_dropped_whole() {
        let provider = Flaky {
            calls: AtomicUsize::new(0),
        };
        let chunks = vec![chunk("a"), chunk("bb"), chunk("boom"), chunk("c"), chunk("dd")];
        let (embedded, outcomes) =
            embed_chunks(&provider, chunks, 2, Duration::ZERO, &NoProgress).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        let ids: Vec<&str> = embedded.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "bb", "dd"]);
        assert_eq!(embedded[1].embedding, Some(vec![2.0, 1.0]));
        assert_eq!(outcomes[0], BatchOutcome::Embedded { batch: 1, count: 2 });
        assert!(outcomes[1].is_dropped());
        assert_eq!(outcomes[2], BatchOutcome::Embedded { batch: 3, count: 1 });
    }

    #[tokio::test]
    async fn wrong_dimensionality_drops_the_batch() {
        struct Wide;
        #[async_trait]
        impl EmbeddingProvider for Wide {
            fn model_name(&self) -> &str {
                "wide"
            }
            fn dims(&self) -> usize {
                4
            }
            async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
                Ok(texts.iter().map(|_| vec![0.0; 3]).collect())
            }
        }
        let (embedded, outcomes) =
            embed_chunks(&Wide, vec![chunk("x")], 10, Duration::ZERO, &NoProgress).await;
        assert!(embedded.is_empty());
        assert!(matches!(&outcomes[0], BatchOutcome::Dropped { reason, .. } if reason.contains("expected 4")));
    }

    #[test]
    fn openai_response_is_reordered_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.5, 0.5]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.5, 0.5]]);
    }

    #[test]
    fn disabled_provider_needs_no_credentials() {
        let config = EmbeddingConfig {
            provider: "disabled".into(),
            ..EmbeddingConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "disabled");
    }

    #[test]
    fn missing_credential_fails_fast() {
        let config = EmbeddingConfig {
            api_key_env: "NEURASHIELD_TEST_UNSET_KEY".into(),
            ..EmbeddingConfig::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("NEURASHIELD_TEST_UNSET_KEY"));
    }
}
