//! Index administration: `init`, `stats` and `clear`.
//!
//! `stats` gives a quick summary of what's indexed (record count, vector
//! dimensionality, per-type counts and the files contributing the most
//! chunks) to confirm that an ingest did what was expected.

use anyhow::Result;

use neurashield_core::store::{IndexStats, VectorIndex};

use crate::config::Config;
use crate::migrate;
use crate::sqlite_index::SqliteIndex;

/// Files listed under "Top files".
const TOP_FILES: usize = 10;

pub async fn run_init(config: &Config) -> Result<()> {
    migrate::run_migrations(&config.index).await?;
    let index = SqliteIndex::open(&config.index).await?;
    let count = index.count().await?;
    index.close().await;
    println!(
        "initialized {} (collection {}, {} records)",
        config.index.db_path().display(),
        config.index.collection,
        count
    );
    Ok(())
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let index = SqliteIndex::open(&config.index).await?;
    let stats = index.stats().await?;
    index.close().await;

    let db_size = std::fs::metadata(config.index.db_path())
        .map(|m| m.len())
        .unwrap_or(0);
    println!("NeuraShield - Index Stats");
    println!("=========================");
    println!();
    println!("  Index:       {}", config.index.db_path().display());
    println!("  Size:        {}", format_bytes(db_size));
    print!("{}", render_stats(&stats));
    Ok(())
}

pub async fn run_clear(config: &Config) -> Result<()> {
    let index = SqliteIndex::open(&config.index).await?;
    let before = index.count().await?;
    index.clear().await?;
    index.close().await;
    println!(
        "cleared collection {} ({} records removed)",
        config.index.collection, before
    );
    Ok(())
}

fn render_stats(stats: &IndexStats) -> String {
    let mut out = String::new();
    out.push_str(&format!("  Collection:  {}\n", stats.collection));
    out.push_str(&format!("  Chunks:      {}\n", stats.total_chunks));
    out.push_str(&format!(
        "  Dimensions:  {}\n",
        stats
            .dims
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string())
    ));

    if !stats.type_distribution.is_empty() {
        out.push_str("\n  By type:\n");
        for (kind, count) in &stats.type_distribution {
            out.push_str(&format!("  {:<12} {:>8}\n", kind, count));
        }
    }
    if !stats.top_files.is_empty() {
        out.push_str("\n  Top files:\n");
        for (file, count) in stats.top_files.iter().take(TOP_FILES) {
            out.push_str(&format!("  {:<56} {:>6}\n", file, count));
        }
    }
    out.push('\n');
    out
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn renders_type_and_file_breakdown() {
        let stats = IndexStats {
            collection: "c".into(),
            total_chunks: 3,
            dims: Some(1536),
            type_distribution: BTreeMap::from([("class".to_string(), 1), ("function".to_string(), 2)]),
            top_files: vec![("a.py".into(), 2), ("b.py".into(), 1)],
        };
        let out = render_stats(&stats);
        assert!(out.contains("  Chunks:      3\n"));
        assert!(out.contains("  Dimensions:  1536\n"));
        assert!(out.contains("function"));
        assert!(out.find("a.py").unwrap() < out.find("b.py").unwrap());
    }

    #[test]
    fn empty_index_has_no_breakdown() {
        let out = render_stats(&IndexStats {
            collection: "c".into(),
            ..Default::default()
        });
        assert!(out.contains("  Dimensions:  -\n"));
        assert!(!out.contains("By type"));
    }

    #[test]
    fn bytes_are_human_readable() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
