//! In-memory [`VectorIndex`] implementation for tests and dry runs.
//!
//! Uses a `BTreeMap` behind `std::sync::RwLock`. Query is brute-force
//! cosine similarity over all stored vectors.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::IndexedRecord;

use super::{check_dims, rank_hits, IndexStats, MetadataFilter, QueryHit, VectorIndex};

#[derive(Default)]
struct Inner {
    dims: Option<usize>,
    records: BTreeMap<String, IndexedRecord>,
}

/// In-memory index for one collection.
pub struct InMemoryIndex {
    collection: String,
    inner: RwLock<Inner>,
}

impl InMemoryIndex {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            inner: RwLock::new(Inner::default()),
        }
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory index lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn upsert(&self, records: &[IndexedRecord]) -> Result<usize> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let mut dims = inner.dims;
        for record in records {
            check_dims(dims, record.vector.len(), "upsert")?;
            dims = Some(record.vector.len());
        }
        inner.dims = dims;
        for record in records {
            inner.records.insert(record.id.clone(), record.clone());
        }
        Ok(records.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>> {
        let inner = self.inner.read().map_err(poisoned)?;
        if inner.records.is_empty() {
            return Ok(Vec::new());
        }
        check_dims(inner.dims, vector.len(), "query")?;

        let hits = inner
            .records
            .values()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .map(|r| QueryHit {
                id: r.id.clone(),
                distance: 1.0 - cosine_similarity(vector, &r.vector) as f64,
                document: r.document.clone(),
                metadata: r.metadata.clone(),
            })
            .collect();
        Ok(rank_hits(hits, k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.inner.read().map_err(poisoned)?.records.len())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(IndexStats::from_metadata(
            &self.collection,
            inner.dims,
            inner.records.values().map(|r| &r.metadata),
        ))
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.records.clear();
        inner.dims = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn record(id: &str, vector: Vec<f32>, kind: &str) -> IndexedRecord {
        let mut metadata = Metadata::new();
        metadata.insert("type".into(), kind.into());
        metadata.insert("file_path".into(), "a.py".into());
        IndexedRecord {
            id: id.into(),
            vector,
            document: format!("doc {}", id),
            metadata,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let index = InMemoryIndex::new("t");
        index.upsert(&[record("a", vec![1.0, 0.0], "function")]).await.unwrap();
        index.upsert(&[record("a", vec![0.0, 1.0], "class")]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        let hits = index.query(&[0.0, 1.0], 5, None).await.unwrap();
        assert_eq!(hits[0].metadata["type"].as_str(), Some("class"));
        assert!(hits[0].similarity() > 0.999);
    }

    #[tokio::test]
    async fn query_orders_by_distance_and_filters() {
        let index = InMemoryIndex::new("t");
        index
            .upsert(&[
                record("far", vec![0.0, 1.0], "function"),
                record("near", vec![1.0, 0.1], "function"),
                record("cls", vec![1.0, 0.0], "class"),
            ])
            .await
            .unwrap();
        let hits = index.query(&[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), ["cls", "near"]);

        let filter = MetadataFilter::chunk_type("function");
        let hits = index.query(&[1.0, 0.0], 5, Some(&filter)).await.unwrap();
        assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), ["near", "far"]);
    }

    #[tokio::test]
    async fn rejects_dimension_mismatch() {
        let index = InMemoryIndex::new("t");
        index.upsert(&[record("a", vec![1.0, 0.0], "function")]).await.unwrap();
        assert!(index.upsert(&[record("b", vec![1.0, 0.0, 0.0], "function")]).await.is_err());
        assert!(index.query(&[1.0, 0.0, 0.0], 1, None).await.is_err());
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn clear_resets_dimensions() {
        let index = InMemoryIndex::new("t");
        index.upsert(&[record("a", vec![1.0, 0.0], "function")]).await.unwrap();
        index.clear().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        index.upsert(&[record("b", vec![1.0, 0.0, 0.0], "module")]).await.unwrap();
        let stats = index.stats().await.unwrap();
        assert_eq!(stats.dims, Some(3));
        assert_eq!(stats.type_distribution["module"], 1);
    }
}
