//! `shield search`: free-text query against the code index.

use anyhow::{bail, Result};

use neurashield_core::context::ContextBuilder;
use neurashield_core::models::{ChunkKind, SimilarPattern};

use crate::analyze::type_filter;
use crate::config::Config;
use crate::embedding::create_provider;
use crate::sqlite_index::SqliteIndex;

pub async fn run_search(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    kind: Option<ChunkKind>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let embedder = create_provider(&config.embedding)?;
    let index = SqliteIndex::open(&config.index).await?;
    let filter = type_filter(kind);
    let patterns = ContextBuilder::new(embedder.as_ref(), &index, config.retrieval.top_k)
        .with_min_similarity(config.retrieval.min_similarity)
        .retrieve(query, top_k, filter.as_ref())
        .await?;
    index.close().await;

    if patterns.is_empty() {
        println!("No results.");
        return Ok(());
    }
    print!("{}", render_hits(&patterns));
    Ok(())
}

fn render_hits(patterns: &[SimilarPattern]) -> String {
    let mut out = String::new();
    for (i, p) in patterns.iter().enumerate() {
        let meta = |key: &str| {
            p.metadata
                .get(key)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "?".to_string())
        };
        out.push_str(&format!(
            "{}. [{:.2}] {} {} ({})\n",
            i + 1,
            p.similarity_score,
            meta("type"),
            meta("name"),
            meta("file_path")
        ));
        out.push_str(&format!(
            "    lines: {}-{}\n",
            meta("line_start"),
            meta("line_end")
        ));
        let first_line = p.code.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        out.push_str(&format!("    excerpt: \"{}\"\n", first_line.trim()));
        out.push_str(&format!("    id: {}\n\n", p.id));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurashield_core::models::{Metadata, MetadataValue};

    #[test]
    fn hits_show_location_and_excerpt() {
        let mut metadata = Metadata::new();
        metadata.insert("type".into(), "function".into());
        metadata.insert("name".into(), "load".into());
        metadata.insert("file_path".into(), "pkg/io.py".into());
        metadata.insert("line_start".into(), MetadataValue::Int(3));
        metadata.insert("line_end".into(), MetadataValue::Int(9));
        let out = render_hits(&[SimilarPattern {
            id: "pkg_io_py_load_0123".into(),
            similarity_score: 0.876,
            code: "\ndef load(path):\n    return open(path).read()\n".into(),
            metadata,
        }]);
        assert!(out.starts_with("1. [0.88] function load (pkg/io.py)\n"));
        assert!(out.contains("    lines: 3-9\n"));
        assert!(out.contains("excerpt: \"def load(path):\""));
    }
}
