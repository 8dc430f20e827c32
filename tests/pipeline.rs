//! End-to-end tests of the ingest and analysis pipeline with stub
//! providers: extraction → preprocessing → chunking → embedding → index →
//! retrieval → analysis → gate.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use neurashield::config::{Config, ExtractConfig};
use neurashield::extract::{self, Extractor};
use neurashield::ingest::{chunk_files, ingest_code_files, preprocess_all};
use neurashield::progress::NoProgress;
use neurashield::sqlite_index::SqliteIndex;
use neurashield_core::analysis::{Analyzer, ChatModel, CodeSample};
use neurashield_core::context::ContextBuilder;
use neurashield_core::embedding::EmbeddingProvider;
use neurashield_core::gate::evaluate;
use neurashield_core::models::{AnalysisType, ChunkKind, CodeFile};
use neurashield_core::prompts::RenderedPrompt;
use neurashield_core::store::memory::InMemoryIndex;
use neurashield_core::store::VectorIndex;

// ─── Stub providers ─────────────────────────────────────────────────

const DIMS: usize = 8;

/// Deterministic bag-of-bytes embedding.
fn stub_vector(text: &str) -> Vec<f32> {
    let mut v = vec![1.0f32; DIMS];
    for b in text.bytes() {
        v[b as usize % DIMS] += 1.0;
    }
    v
}

struct StubEmbedder {
    calls: AtomicUsize,
    /// 1-based call number that fails, if any.
    fail_on_call: Option<usize>,
}

impl StubEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on_call: None,
        }
    }

    fn failing_on(call: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on_call: Some(call),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            bail!("stub failure on call {}", call);
        }
        Ok(texts.iter().map(|t| stub_vector(t)).collect())
    }
}

/// Replies to every prompt with the same critical SQL injection report.
struct StubChat;

const CRITICAL_REPLY: &str = r#"```json
{
  "has_bugs": true,
  "bugs_found": [
    {"type": "sql_injection", "severity": "critical", "line": 2,
     "description": "query built by concatenation", "fix": "use parameters"}
  ],
  "overall_risk": "critical",
  "vulnerabilities": [
    {"type": "SQL Injection", "severity": "critical", "cvss_score": 9.8, "line": 2,
     "description": "user input in query"}
  ],
  "security_score": 9.8,
  "overall_severity": "critical"
}
```"#;

#[async_trait]
impl ChatModel for StubChat {
    fn model_name(&self) -> &str {
        "stub-chat"
    }
    async fn complete(&self, _prompt: &RenderedPrompt) -> Result<String> {
        Ok(CRITICAL_REPLY.to_string())
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

const QUERY_CODE: &str =
    "def get(id):\n    query = 'SELECT * FROM t WHERE id=' + id\n    return run(query)";

fn write_repo(root: &Path) {
    fs::create_dir_all(root.join("app")).unwrap();
    fs::write(
        root.join("app/db.py"),
        "import sqlite3\n\nTIMEOUT = 5\n\n\ndef fetch(conn, id):\n    # raw query\n    return conn.execute('SELECT * FROM users WHERE id=' + id)\n\n\nasync def ping(conn):\n    return await conn.ping()\n",
    )
    .unwrap();
    fs::write(
        root.join("app/models.py"),
        "class User:\n    def __init__(self, name):\n        self.name = name\n\n    def greet(self):\n        return 'hi ' + self.name\n\n\ndef make(name):\n    return User(name)\n",
    )
    .unwrap();
    fs::write(root.join("app/bad.py"), "def oops(:\n").unwrap();
}

fn extract_repo(root: &Path) -> Vec<CodeFile> {
    let extractor = Extractor::new(&ExtractConfig::default()).unwrap();
    let (files, _skipped) = extract::partition(extractor.extract_dir(root).unwrap());
    files
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.embedding.batch_delay_ms = 0;
    config
}

// ─── Extraction and chunking ────────────────────────────────────────

#[test]
fn test_extraction_yields_one_record_per_valid_file() {
    let tmp = TempDir::new().unwrap();
    write_repo(tmp.path());

    let extractor = Extractor::new(&ExtractConfig::default()).unwrap();
    let (files, skipped) = extract::partition(extractor.extract_dir(tmp.path()).unwrap());

    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["app/db.py", "app/models.py"]);
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].0, "app/bad.py");

    for file in &files {
        let non_blank = file.source.lines().filter(|l| !l.trim().is_empty()).count();
        assert_eq!(file.loc, non_blank, "loc mismatch for {}", file.path);
    }
}

#[test]
fn test_chunks_cover_every_top_level_definition() {
    let tmp = TempDir::new().unwrap();
    write_repo(tmp.path());
    let config = test_config();
    let mut files = extract_repo(tmp.path());
    preprocess_all(&mut files, &config);
    let (chunks, duplicates) = chunk_files(&files, &config);
    assert_eq!(duplicates, 0);

    for file in &files {
        for func in file.functions.iter().filter(|f| f.top_level) {
            assert!(
                chunks.iter().any(|c| c.file_path == file.path
                    && c.kind == ChunkKind::Function
                    && c.name == func.name
                    && c.line_start <= func.line_start
                    && c.line_end >= func.line_end),
                "no chunk covers {}::{}",
                file.path,
                func.name
            );
        }
        for class in file.classes.iter().filter(|c| c.top_level) {
            assert!(chunks
                .iter()
                .any(|c| c.kind == ChunkKind::Class && c.name == class.name));
        }
    }
    // db.py has module-level code (import, constant)
    assert!(chunks
        .iter()
        .any(|c| c.file_path == "app/db.py" && c.kind == ChunkKind::Module));
    assert!(chunks.iter().all(|c| c.token_count <= config.chunking.max_tokens));
}

// ─── Ingest ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ingest_embeds_every_chunk() {
    let tmp = TempDir::new().unwrap();
    write_repo(tmp.path());
    let config = test_config();
    let files = extract_repo(tmp.path());
    let index = InMemoryIndex::new("test");

    let stats = ingest_code_files(files, &config, &StubEmbedder::new(), &index, &NoProgress)
        .await
        .unwrap();

    assert!(stats.chunks_created > 0);
    assert_eq!(stats.embeddings_generated, stats.chunks_created);
    assert_eq!(stats.stored_in_index, stats.chunks_created);
    assert_eq!(stats.batches_dropped, 0);
    assert_eq!(index.count().await.unwrap(), stats.chunks_created);
}

#[tokio::test]
async fn test_failed_batch_is_dropped_not_fatal() {
    let tmp = TempDir::new().unwrap();
    write_repo(tmp.path());
    let mut config = test_config();
    config.embedding.batch_size = 1;
    let files = extract_repo(tmp.path());
    let index = InMemoryIndex::new("test");

    let stats = ingest_code_files(files, &config, &StubEmbedder::failing_on(2), &index, &NoProgress)
        .await
        .unwrap();

    assert_eq!(stats.batches_dropped, 1);
    assert_eq!(stats.embeddings_generated, stats.chunks_created - 1);
    assert_eq!(index.count().await.unwrap(), stats.chunks_created - 1);
}

#[tokio::test]
async fn test_reingest_replaces_records() {
    let tmp = TempDir::new().unwrap();
    write_repo(tmp.path().join("repo").as_path());
    let config = test_config();
    let index = SqliteIndex::open_path(&tmp.path().join("index/index.sqlite"), "test")
        .await
        .unwrap();

    let first = ingest_code_files(
        extract_repo(&tmp.path().join("repo")),
        &config,
        &StubEmbedder::new(),
        &index,
        &NoProgress,
    )
    .await
    .unwrap();
    let second = ingest_code_files(
        extract_repo(&tmp.path().join("repo")),
        &config,
        &StubEmbedder::new(),
        &index,
        &NoProgress,
    )
    .await
    .unwrap();

    assert_eq!(first.stored_in_index, second.stored_in_index);
    assert_eq!(index.count().await.unwrap(), first.chunks_created);
    let stats = index.stats().await.unwrap();
    assert_eq!(stats.dims, Some(DIMS));
    assert!(stats.type_distribution.contains_key("function"));
    index.close().await;
}

// ─── Analysis ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_analysis_against_empty_index() {
    let embedder = StubEmbedder::new();
    let index = InMemoryIndex::new("empty");
    let analyzer = Analyzer::new(ContextBuilder::new(&embedder, &index, 5), &StubChat);

    let result = analyzer.analyze_code(QUERY_CODE, AnalysisType::All, None).await;

    assert_eq!(result.retrieved_patterns_count, 0);
    assert!(result.retrieved_patterns.is_empty());
    assert!(result.context_error.is_none());
    assert_eq!(result.analysis_type, "all");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);

    let bugs = result.bug_analysis.as_ref().unwrap();
    assert_eq!(bugs["has_bugs"], true);
    assert_eq!(bugs["bugs_found"][0]["type"], "sql_injection");
    assert!(result.optimization_analysis.is_some());
    assert!(result.security_analysis.is_some());

    let gate = evaluate(&[result]);
    assert!(gate.blocks());
}

#[tokio::test]
async fn test_analysis_retrieves_indexed_patterns() {
    let tmp = TempDir::new().unwrap();
    write_repo(tmp.path());
    let config = test_config();
    let embedder = StubEmbedder::new();
    let index = InMemoryIndex::new("test");
    ingest_code_files(extract_repo(tmp.path()), &config, &embedder, &index, &NoProgress)
        .await
        .unwrap();

    let analyzer = Analyzer::new(ContextBuilder::new(&embedder, &index, 3), &StubChat);
    let results = analyzer
        .batch_analyze(
            &[CodeSample {
                name: None,
                code: QUERY_CODE.to_string(),
            }],
            AnalysisType::Security,
        )
        .await;

    let result = &results[0];
    assert_eq!(result.sample_name.as_deref(), Some("sample_1"));
    assert_eq!(result.retrieved_patterns_count, 3);
    let scores: Vec<f64> = result
        .retrieved_patterns
        .iter()
        .map(|p| p.similarity_score)
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    assert!(result.bug_analysis.is_none());
    assert!(result.security_analysis.is_some());
}
