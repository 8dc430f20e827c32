//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait defines the operations the ingestion and
//! retrieval paths need from a persistent collection of
//! [`IndexedRecord`]s. Backends: [`memory::InMemoryIndex`] here, and the
//! SQLite index in the app crate.
//!
//! Distances are cosine distances (`1 - cosine similarity`); callers
//! convert back with [`QueryHit::similarity`].
//!
//! The first upsert into an empty collection fixes its dimensionality.
//! Later upserts or queries with a different vector length are rejected.

pub mod memory;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{IndexedRecord, Metadata, MetadataValue};

/// One nearest-neighbor result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub id: String,
    pub distance: f64,
    pub document: String,
    pub metadata: Metadata,
}

impl QueryHit {
    pub fn similarity(&self) -> f64 {
        1.0 - self.distance
    }
}

/// Equality predicate over record metadata: every entry must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    pub equals: BTreeMap<String, MetadataValue>,
}

impl MetadataFilter {
    /// Filter on a single key.
    pub fn field(key: &str, value: impl Into<MetadataValue>) -> Self {
        let mut equals = BTreeMap::new();
        equals.insert(key.to_string(), value.into());
        Self { equals }
    }

    /// Filter on chunk type (`function`, `class`, `module`).
    pub fn chunk_type(kind: &str) -> Self {
        Self::field("type", kind)
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.equals
            .iter()
            .all(|(k, v)| metadata.get(k).is_some_and(|m| m == v))
    }
}

/// Summary of a collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub collection: String,
    pub total_chunks: usize,
    pub dims: Option<usize>,
    /// Record count per `type` metadata value.
    pub type_distribution: BTreeMap<String, usize>,
    /// `(file_path, count)`, most records first.
    pub top_files: Vec<(String, usize)>,
}

impl IndexStats {
    /// Build stats from the metadata of every stored record.
    pub fn from_metadata<'a>(
        collection: &str,
        dims: Option<usize>,
        metadata: impl IntoIterator<Item = &'a Metadata>,
    ) -> Self {
        let mut type_distribution: BTreeMap<String, usize> = BTreeMap::new();
        let mut file_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut total = 0;
        for meta in metadata {
            total += 1;
            let kind = meta
                .get("type")
                .map(|v| v.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            *type_distribution.entry(kind).or_default() += 1;
            let file = meta
                .get("file_path")
                .map(|v| v.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            *file_counts.entry(file).or_default() += 1;
        }
        let mut top_files: Vec<(String, usize)> = file_counts.into_iter().collect();
        top_files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Self {
            collection: collection.to_string(),
            total_chunks: total,
            dims,
            type_distribution,
            top_files,
        }
    }
}

/// A named, persistent collection of vectors.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Insert or replace records by id |
/// | [`query`](VectorIndex::query) | k nearest records, optionally filtered |
/// | [`count`](VectorIndex::count) | Number of stored records |
/// | [`stats`](VectorIndex::stats) | Count plus grouping by type and file |
/// | [`clear`](VectorIndex::clear) | Drop every record in the collection |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn collection(&self) -> &str;

    /// Insert or replace records. Returns the number written.
    async fn upsert(&self, records: &[IndexedRecord]) -> Result<usize>;

    /// Return up to `k` records nearest to `vector`, ascending by distance
    /// (ties by id).
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>>;

    async fn count(&self) -> Result<usize>;

    async fn stats(&self) -> Result<IndexStats>;

    async fn clear(&self) -> Result<()>;
}

/// Reject vectors whose length disagrees with the collection.
pub fn check_dims(expected: Option<usize>, actual: usize, what: &str) -> Result<()> {
    if actual == 0 {
        anyhow::bail!("{} vector is empty", what);
    }
    if let Some(expected) = expected {
        if expected != actual {
            anyhow::bail!(
                "{} vector has {} dimensions but the collection stores {}-dimensional vectors",
                what,
                actual,
                expected
            );
        }
    }
    Ok(())
}

/// Sort hits ascending by distance, ties by id, and keep the first `k`.
pub fn rank_hits(mut hits: Vec<QueryHit>, k: usize) -> Vec<QueryHit> {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_requires_every_entry() {
        let mut meta = Metadata::new();
        meta.insert("type".into(), "function".into());
        meta.insert("line_start".into(), MetadataValue::Int(3));
        assert!(MetadataFilter::chunk_type("function").matches(&meta));
        assert!(!MetadataFilter::chunk_type("class").matches(&meta));
        assert!(MetadataFilter::field("line_start", 3i64).matches(&meta));
        assert!(!MetadataFilter::field("missing", "x").matches(&meta));
    }

    #[test]
    fn stats_group_by_type_and_file() {
        let mk = |t: &str, f: &str| {
            let mut m = Metadata::new();
            m.insert("type".into(), t.into());
            m.insert("file_path".into(), f.into());
            m
        };
        let metas = [mk("function", "a.py"), mk("class", "a.py"), mk("function", "b.py")];
        let stats = IndexStats::from_metadata("c", Some(3), metas.iter());
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.type_distribution["function"], 2);
        assert_eq!(stats.top_files[0], ("a.py".to_string(), 2));
    }

    #[test]
    fn dims_mismatch_is_rejected() {
        assert!(check_dims(Some(3), 3, "query").is_ok());
        assert!(check_dims(None, 5, "upsert").is_ok());
        assert!(check_dims(Some(3), 4, "query").is_err());
        assert!(check_dims(None, 0, "upsert").is_err());
    }
}
