//! Analysis commands: `context`, `analyze`, `analyze-repo` and `pr`.
//!
//! Each command wires the configured embedding provider, the SQLite index
//! and the chat model into an [`Analyzer`], runs it, and writes results as
//! pretty JSON next to a human-readable report.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use neurashield_core::analysis::{Analyzer, CodeSample};
use neurashield_core::context::ContextBuilder;
use neurashield_core::embedding::EmbeddingProvider;
use neurashield_core::models::{AnalysisResult, AnalysisType, ChunkKind};
use neurashield_core::report::{batch_text_report, pr_markdown, text_report};
use neurashield_core::store::{MetadataFilter, VectorIndex};

use crate::config::Config;
use crate::embedding::create_provider;
use crate::extract::{self, Extractor, RepoSource};
use crate::llm::create_chat;
use crate::sqlite_index::SqliteIndex;

/// Write `value` as pretty JSON, creating parent directories.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_text(path, &json)
}

pub fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn type_filter(kind: Option<ChunkKind>) -> Option<MetadataFilter> {
    kind.map(|k| MetadataFilter::chunk_type(k.as_str()))
}

fn context_builder<'a>(
    config: &Config,
    embedder: &'a dyn EmbeddingProvider,
    index: &'a dyn VectorIndex,
) -> ContextBuilder<'a> {
    ContextBuilder::new(embedder, index, config.retrieval.top_k)
        .with_min_similarity(config.retrieval.min_similarity)
}

fn read_source(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// `shield context <file>`: build and save (or print) the retrieval context.
pub async fn run_context(
    config: &Config,
    file: &Path,
    top_k: Option<usize>,
    kind: Option<ChunkKind>,
    out: Option<&Path>,
) -> Result<()> {
    let code = read_source(file)?;
    let embedder = create_provider(&config.embedding)?;
    let index = SqliteIndex::open(&config.index).await?;
    let builder = context_builder(config, embedder.as_ref(), &index);
    let filter = type_filter(kind);

    let rag = builder
        .build(&code, "context", top_k, filter.as_ref())
        .await?;
    index.close().await;

    match out {
        Some(path) => {
            write_json(path, &rag)?;
            println!(
                "context for {}: {} pattern(s) saved to {}",
                file.display(),
                rag.num_patterns,
                path.display()
            );
        }
        None if rag.num_patterns == 0 => println!("No similar patterns found."),
        None => println!("{}", rag.formatted_context),
    }
    Ok(())
}

fn print_summary(results: &[AnalysisResult]) {
    for result in results {
        let mut line = format!(
            "  {}  patterns: {}  bugs: {}  vulnerabilities: {}",
            result.label(),
            result.retrieved_patterns_count,
            result.bug_count(),
            result.vulnerability_count()
        );
        if let Some(err) = &result.context_error {
            line.push_str(&format!("  (context error: {})", err));
        }
        println!("{}", line);
    }
}

/// `shield analyze <file>`.
pub async fn run_analyze(
    config: &Config,
    file: &Path,
    analysis_type: AnalysisType,
    out: Option<PathBuf>,
    report: Option<PathBuf>,
) -> Result<()> {
    let code = read_source(file)?;
    let embedder = create_provider(&config.embedding)?;
    let chat = create_chat(&config.llm)?;
    let index = SqliteIndex::open(&config.index).await?;

    let analyzer = Analyzer::new(
        context_builder(config, embedder.as_ref(), &index),
        chat.as_ref(),
    );
    let mut result = analyzer.analyze_code(&code, analysis_type, None).await;
    result.file_path = Some(file.display().to_string());
    index.close().await;

    let out = out.unwrap_or_else(|| config.output.analysis_results.clone());
    let report = report.unwrap_or_else(|| config.output.analysis_report.clone());
    let results = vec![result];
    write_json(&out, &results)?;
    write_text(&report, &text_report(&results[0]))?;

    println!("analyze {} ({})", file.display(), analysis_type);
    print_summary(&results);
    println!("  results: {}", out.display());
    println!("  report: {}", report.display());
    Ok(())
}

/// `shield analyze-repo <repo>`: extract every file and analyze each one.
pub async fn run_analyze_repo(config: &Config, repo: &str, analysis_type: AnalysisType) -> Result<()> {
    let embedder = create_provider(&config.embedding)?;
    let chat = create_chat(&config.llm)?;

    let source = RepoSource::parse(repo);
    let mut extractor = Extractor::new(&config.extract)?;
    let outcomes = extractor.extract(&source)?;
    extractor.cleanup()?;
    let (files, skipped) = extract::partition(outcomes);
    info!(files = files.len(), skipped = skipped.len(), "extracted repository");
    println!("Analyzing {} files from {}", files.len(), source);

    let samples: Vec<CodeSample> = files
        .iter()
        .map(|f| CodeSample {
            name: Some(f.path.clone()),
            code: f.source.clone(),
        })
        .collect();

    let index = SqliteIndex::open(&config.index).await?;
    let analyzer = Analyzer::new(
        context_builder(config, embedder.as_ref(), &index),
        chat.as_ref(),
    );
    let mut results = analyzer.batch_analyze(&samples, analysis_type).await;
    index.close().await;
    for result in &mut results {
        result.file_path = result.sample_name.clone();
    }

    write_json(&config.output.repo_results, &results)?;
    write_text(&config.output.repo_report, &batch_text_report(&results))?;

    print_summary(&results);
    println!("  results: {}", config.output.repo_results.display());
    println!("  report: {}", config.output.repo_report.display());
    Ok(())
}

/// Changed `.py` files that can be read, with their contents.
pub fn readable_python_files(paths: &[String]) -> Vec<(String, String)> {
    let mut files = Vec::new();
    for path in paths.iter().filter(|p| p.ends_with(".py")) {
        match std::fs::read(path) {
            Ok(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => {
                files.push((path.clone(), String::from_utf8_lossy(&bytes).into_owned()));
            }
            Ok(_) => info!(path = %path, "skipping empty file"),
            Err(err) => warn!(path = %path, error = %err, "cannot read file"),
        }
    }
    files
}

/// `shield pr <files..>`: full analysis of changed Python files.
pub async fn run_pr(config: &Config, paths: &[String]) -> Result<()> {
    println!("Analyzing {} changed files...", paths.len());
    let files = readable_python_files(paths);
    if files.is_empty() {
        println!("No files to analyze");
        return Ok(());
    }

    let embedder = create_provider(&config.embedding)?;
    let chat = create_chat(&config.llm)?;
    let index = SqliteIndex::open(&config.index).await?;
    let analyzer = Analyzer::new(
        context_builder(config, embedder.as_ref(), &index),
        chat.as_ref(),
    );

    let mut results = Vec::with_capacity(files.len());
    for (path, code) in &files {
        println!("Analyzing: {}", path);
        let mut result = analyzer.analyze_code(code, AnalysisType::All, None).await;
        result.file_path = Some(path.clone());
        results.push(result);
    }
    index.close().await;

    write_json(&config.output.pr_results, &results)?;
    write_text(&config.output.pr_report, &pr_markdown(&results))?;

    print_summary(&results);
    println!("  results: {}", config.output.pr_results.display());
    println!("  report: {}", config.output.pr_report.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pr_reads_only_python_files_with_content() {
        let tmp = tempfile::TempDir::new().unwrap();
        let good = tmp.path().join("good.py");
        let blank = tmp.path().join("blank.py");
        let notes = tmp.path().join("notes.md");
        std::fs::write(&good, "x = 1\n").unwrap();
        std::fs::write(&blank, "\n  \n").unwrap();
        std::fs::write(&notes, "# hi").unwrap();
        let missing = tmp.path().join("gone.py");

        let paths: Vec<String> = [&good, &blank, &notes, &missing]
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        let files = readable_python_files(&paths);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].1, "x = 1\n");
    }

    #[test]
    fn write_json_creates_parents() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested/out.json");
        write_json(&path, &vec![AnalysisResult::default()]).unwrap();
        let back: Vec<AnalysisResult> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.len(), 1);
    }

    #[test]
    fn type_filter_matches_chunk_type() {
        assert!(type_filter(None).is_none());
        let filter = type_filter(Some(ChunkKind::Class)).unwrap();
        let mut meta = neurashield_core::models::Metadata::new();
        meta.insert("type".into(), "class".into());
        assert!(filter.matches(&meta));
    }
}
