//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow: extract → preprocess → chunk → embed →
//! store. Extraction skips and dropped embedding batches are counted and
//! logged; they never abort the run.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use neurashield_core::chunk::chunk_file;
use neurashield_core::embedding::{estimate_cost, CostEstimate, EmbeddingProvider};
use neurashield_core::models::{Chunk, CodeFile};
use neurashield_core::preprocess::preprocess_file;
use neurashield_core::store::{check_dims, VectorIndex};

use crate::config::Config;
use crate::embedding::{create_provider, embed_chunks, BatchOutcome};
use crate::extract::{self, Extractor, RepoSource};
use crate::progress::{IngestEvent, ProgressReporter};
use crate::sqlite_index::SqliteIndex;

/// Counters for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    pub files_extracted: usize,
    pub files_skipped: usize,
    pub chunks_created: usize,
    pub duplicate_ids: usize,
    pub total_tokens: usize,
    pub embeddings_generated: usize,
    pub batches_dropped: usize,
    pub stored_in_index: usize,
}

/// Preprocess every file in place.
pub fn preprocess_all(files: &mut [CodeFile], config: &Config) {
    for file in files.iter_mut() {
        preprocess_file(file, config.preprocess.remove_comments);
    }
}

/// Chunk preprocessed files, dropping chunks whose id was already seen in
/// this run. Returns the chunks and the number of duplicates dropped.
pub fn chunk_files(files: &[CodeFile], config: &Config) -> (Vec<Chunk>, usize) {
    let opts = config.chunking.options();
    let mut seen = HashSet::new();
    let mut chunks = Vec::new();
    let mut duplicates = 0;
    for file in files {
        for chunk in chunk_file(file, opts) {
            if seen.insert(chunk.id.clone()) {
                chunks.push(chunk);
            } else {
                duplicates += 1;
                warn!(id = %chunk.id, file = %chunk.file_path, "duplicate chunk id; keeping the first");
            }
        }
    }
    (chunks, duplicates)
}

pub fn cost_for(chunks: &[Chunk], config: &Config) -> CostEstimate {
    let tokens = chunks.iter().map(|c| c.token_count).sum();
    estimate_cost(
        &config.embedding.model,
        tokens,
        config.embedding.price_per_million,
    )
}

/// Preprocess, chunk, embed and store already-extracted files.
///
/// Fails before any embedding call when the provider's dimensionality
/// disagrees with vectors already stored in the collection.
pub async fn ingest_code_files(
    mut files: Vec<CodeFile>,
    config: &Config,
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    progress: &dyn ProgressReporter,
) -> Result<PipelineStats> {
    let existing_dims = index.stats().await?.dims;
    if let Some(expected) = existing_dims.filter(|_| embedder.dims() > 0) {
        check_dims(Some(expected), embedder.dims(), embedder.model_name()).with_context(|| {
            format!(
                "collection {} was built with a different embedding model",
                index.collection()
            )
        })?;
    }

    let mut stats = PipelineStats {
        files_extracted: files.len(),
        ..Default::default()
    };

    preprocess_all(&mut files, config);
    progress.report(IngestEvent::Chunking {
        files: files.len() as u64,
    });
    let (chunks, duplicates) = chunk_files(&files, config);
    stats.chunks_created = chunks.len();
    stats.duplicate_ids = duplicates;

    let cost = cost_for(&chunks, config);
    stats.total_tokens = cost.total_tokens;
    info!(
        chunks = chunks.len(),
        tokens = cost.total_tokens,
        cost = %cost.formatted_cost(),
        model = %cost.model,
        "embedding chunks"
    );

    let (embedded, outcomes) = embed_chunks(
        embedder,
        chunks,
        config.embedding.batch_size,
        Duration::from_millis(config.embedding.batch_delay_ms),
        progress,
    )
    .await;
    stats.embeddings_generated = embedded.len();
    stats.batches_dropped = outcomes.iter().filter(|o| o.is_dropped()).count();
    info!(
        embedded = embedded.len(),
        batches = %describe_outcomes(&outcomes),
        "embedding finished"
    );

    let records: Vec<_> = embedded.iter().filter_map(Chunk::to_record).collect();
    progress.report(IngestEvent::Storing {
        chunks: records.len() as u64,
    });
    for batch in records.chunks(config.embedding.batch_size.max(1)) {
        let stored = stats.stored_in_index;
        stats.stored_in_index += index.upsert(batch).await.with_context(|| {
            format!(
                "upsert failed after {} of {} records were stored",
                stored,
                records.len()
            )
        })?;
    }

    Ok(stats)
}

/// `shield ingest <repo>`.
pub async fn run_ingest(
    config: &Config,
    repo: &str,
    dry_run: bool,
    save_extracted: Option<&Path>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let source = RepoSource::parse(repo);
    progress.report(IngestEvent::Extracting {
        repo: source.to_string(),
    });

    let mut extractor = Extractor::new(&config.extract)?;
    let outcomes = extractor.extract(&source)?;
    extractor.cleanup()?;

    let (mut files, skipped) = extract::partition(outcomes);
    for (path, reason) in &skipped {
        info!(path = %path, reason = %reason, "skipped file");
    }
    info!(extracted = files.len(), skipped = skipped.len(), "extraction finished");

    if let Some(path) = save_extracted {
        let mut snapshot = files.clone();
        preprocess_all(&mut snapshot, config);
        extract::save_json(&snapshot, path)?;
    }

    if dry_run {
        preprocess_all(&mut files, config);
        let (chunks, duplicates) = chunk_files(&files, config);
        let cost = cost_for(&chunks, config);
        println!("ingest {} (dry-run)", source);
        println!("  files extracted: {}", files.len());
        println!("  files skipped: {}", skipped.len());
        println!("  chunks: {}", chunks.len());
        if duplicates > 0 {
            println!("  duplicate ids dropped: {}", duplicates);
        }
        println!("  tokens: {}", cost.total_tokens);
        println!(
            "  estimated cost: {} ({} at ${:.2}/1M tokens)",
            cost.formatted_cost(),
            cost.model,
            cost.cost_per_million_tokens
        );
        return Ok(());
    }

    let embedder = create_provider(&config.embedding)?;
    let index = SqliteIndex::open(&config.index).await?;
    let mut stats = ingest_code_files(files, config, embedder.as_ref(), &index, progress).await?;
    stats.files_skipped = skipped.len();
    let total = index.count().await?;
    index.close().await;

    println!("ingest {}", source);
    println!("  files extracted: {}", stats.files_extracted);
    println!("  files skipped: {}", stats.files_skipped);
    println!("  chunks created: {}", stats.chunks_created);
    if stats.duplicate_ids > 0 {
        println!("  duplicate ids dropped: {}", stats.duplicate_ids);
    }
    println!("  embeddings generated: {}", stats.embeddings_generated);
    if stats.batches_dropped > 0 {
        println!("  batches dropped: {}", stats.batches_dropped);
    }
    println!("  stored in index: {}", stats.stored_in_index);
    println!("  collection total: {}", total);
    println!("ok");
    Ok(())
}

/// Summarize batch outcomes for logs.
pub fn describe_outcomes(outcomes: &[BatchOutcome]) -> String {
    let dropped = outcomes.iter().filter(|o| o.is_dropped()).count();
    format!("{} batches, {} dropped", outcomes.len(), dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::parse_source;
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use neurashield_core::models::IndexedRecord;
    use neurashield_core::store::memory::InMemoryIndex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ThreeDims {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for ThreeDims {
        fn model_name(&self) -> &str {
            "three"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn dimension_mismatch_fails_before_embedding() {
        let index = InMemoryIndex::new("code");
        index
            .upsert(&[IndexedRecord {
                id: "old".into(),
                vector: vec![1.0, 0.0],
                document: "def old(): pass".into(),
                metadata: Default::default(),
            }])
            .await
            .unwrap();
        let embedder = ThreeDims {
            calls: AtomicUsize::new(0),
        };
        let file = parse_source("a.py", "/a.py", "def f():\n    return 1\n").unwrap();

        let err = ingest_code_files(vec![file], &Config::default(), &embedder, &index, &NoProgress)
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("different embedding model"));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn matching_dimensions_ingest_normally() {
        let index = InMemoryIndex::new("code");
        let embedder = ThreeDims {
            calls: AtomicUsize::new(0),
        };
        let file = parse_source("a.py", "/a.py", "def f():\n    return 1\n").unwrap();
        let mut config = Config::default();
        config.embedding.batch_delay_ms = 0;

        let stats = ingest_code_files(vec![file], &config, &embedder, &index, &NoProgress)
            .await
            .unwrap();

        assert_eq!(stats.stored_in_index, 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_ids_within_a_run_are_dropped() {
        let file = parse_source("a.py", "/a.py", "def f():\n    return 1\n").unwrap();
        let config = Config::default();
        let mut files = vec![file.clone(), file];
        preprocess_all(&mut files, &config);
        let (chunks, duplicates) = chunk_files(&files, &config);
        assert_eq!(chunks.len(), 1);
        assert_eq!(duplicates, 1);
    }

    #[test]
    fn cost_reflects_chunk_tokens() {
        let file = parse_source("a.py", "/a.py", "def f():\n    return 1\n").unwrap();
        let config = Config::default();
        let mut files = vec![file];
        preprocess_all(&mut files, &config);
        let (chunks, _) = chunk_files(&files, &config);
        let cost = cost_for(&chunks, &config);
        assert_eq!(cost.total_tokens, chunks[0].token_count);
        assert_eq!(cost.model, "text-embedding-3-small");
    }

    #[test]
    fn outcome_summary_counts_drops() {
        let outcomes = vec![
            BatchOutcome::Embedded { batch: 1, count: 3 },
            BatchOutcome::Dropped {
                batch: 2,
                size: 3,
                reason: "x".into(),
            },
        ];
        assert_eq!(describe_outcomes(&outcomes), "2 batches, 1 dropped");
    }
}
