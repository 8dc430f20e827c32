//! SQLite-backed [`VectorIndex`].
//!
//! Records live in the `records` table keyed by `(collection, id)`, with
//! vectors stored as little-endian f32 BLOBs. Queries are brute-force
//! cosine similarity over every vector in the collection, computed in Rust.
//! The `collections` row records the dimensionality fixed by the first
//! upsert.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use neurashield_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use neurashield_core::models::{IndexedRecord, Metadata};
use neurashield_core::store::{
    check_dims, rank_hits, IndexStats, MetadataFilter, QueryHit, VectorIndex,
};

use crate::config::IndexConfig;
use crate::db;
use crate::migrate;

pub struct SqliteIndex {
    pool: SqlitePool,
    collection: String,
}

impl SqliteIndex {
    /// Open (creating if needed) the configured index and collection.
    pub async fn open(index: &IndexConfig) -> Result<Self> {
        Self::open_path(&index.db_path(), &index.collection).await
    }

    pub async fn open_path(db_path: &Path, collection: &str) -> Result<Self> {
        let pool = db::connect_path(db_path).await?;
        migrate::apply_schema(&pool).await?;
        sqlx::query(
            "INSERT OR IGNORE INTO collections (name, dims, created_at) VALUES (?, NULL, ?)",
        )
        .bind(collection)
        .bind(chrono::Utc::now().timestamp())
        .execute(&pool)
        .await?;
        Ok(Self {
            pool,
            collection: collection.to_string(),
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    async fn dims(&self) -> Result<Option<usize>> {
        let dims: Option<Option<i64>> =
            sqlx::query_scalar("SELECT dims FROM collections WHERE name = ?")
                .bind(&self.collection)
                .fetch_optional(&self.pool)
                .await?;
        Ok(dims.flatten().map(|d| d as usize))
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn upsert(&self, records: &[IndexedRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut dims = self.dims().await?;
        for record in records {
            check_dims(dims, record.vector.len(), "upsert")?;
            dims = Some(record.vector.len());
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE collections SET dims = ? WHERE name = ? AND dims IS NULL")
            .bind(dims.map(|d| d as i64))
            .bind(&self.collection)
            .execute(&mut *tx)
            .await?;

        for record in records {
            let metadata_json = serde_json::to_string(&record.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO records (collection, id, document, metadata_json, embedding, dims, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document = excluded.document,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    dims = excluded.dims,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&self.collection)
            .bind(&record.id)
            .bind(&record.document)
            .bind(&metadata_json)
            .bind(vec_to_blob(&record.vector))
            .bind(record.vector.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert record {}", record.id))?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>> {
        if self.count().await? == 0 {
            return Ok(Vec::new());
        }
        check_dims(self.dims().await?, vector.len(), "query")?;

        let rows = sqlx::query(
            "SELECT id, document, metadata_json, embedding FROM records WHERE collection = ?",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let metadata_json: String = row.try_get("metadata_json")?;
            let metadata: Metadata = serde_json::from_str(&metadata_json).unwrap_or_default();
            if let Some(f) = filter {
                if !f.matches(&metadata) {
                    continue;
                }
            }
            let blob: Vec<u8> = row.try_get("embedding")?;
            let stored = blob_to_vec(&blob);
            hits.push(QueryHit {
                id: row.try_get("id")?,
                distance: 1.0 - cosine_similarity(vector, &stored) as f64,
                document: row.try_get("document")?,
                metadata,
            });
        }
        Ok(rank_hits(hits, k))
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn stats(&self) -> Result<IndexStats> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT metadata_json FROM records WHERE collection = ?")
                .bind(&self.collection)
                .fetch_all(&self.pool)
                .await?;
        let metadata: Vec<Metadata> = rows
            .iter()
            .map(|json| serde_json::from_str(json).unwrap_or_default())
            .collect();
        Ok(IndexStats::from_metadata(
            &self.collection,
            self.dims().await?,
            metadata.iter(),
        ))
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(&self.collection)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE collections SET dims = NULL WHERE name = ?")
            .bind(&self.collection)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurashield_core::models::MetadataValue;
    use tempfile::TempDir;

    fn record(id: &str, vector: Vec<f32>, kind: &str, file: &str) -> IndexedRecord {
        let mut metadata = Metadata::new();
        metadata.insert("type".into(), kind.into());
        metadata.insert("file_path".into(), file.into());
        metadata.insert("line_start".into(), MetadataValue::Int(1));
        IndexedRecord {
            id: id.into(),
            vector,
            document: format!("def {}(): pass", id),
            metadata,
        }
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        let index = SqliteIndex::open_path(&path, "c").await.unwrap();
        index
            .upsert(&[record("a", vec![1.0, 0.0], "function", "x.py")])
            .await
            .unwrap();
        index.close().await;

        let index = SqliteIndex::open_path(&path, "c").await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        let hits = index.query(&[1.0, 0.0], 3, None).await.unwrap();
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].metadata["line_start"], MetadataValue::Int(1));
        assert!(hits[0].similarity() > 0.999);
    }

    #[tokio::test]
    async fn upsert_replaces_and_counts_distinct_ids() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open_path(&tmp.path().join("i.sqlite"), "c").await.unwrap();
        let batch: Vec<_> = (0..5)
            .map(|i| record(&format!("r{}", i), vec![i as f32 + 1.0, 1.0], "function", "x.py"))
            .collect();
        index.upsert(&batch).await.unwrap();
        index.upsert(&batch).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 5);

        index
            .upsert(&[record("r0", vec![0.0, 1.0], "class", "y.py")])
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 5);
        let stats = index.stats().await.unwrap();
        assert_eq!(stats.type_distribution["class"], 1);
        assert_eq!(stats.top_files[0], ("x.py".to_string(), 4));
        assert_eq!(stats.dims, Some(2));
    }

    #[tokio::test]
    async fn filter_and_dimension_checks() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open_path(&tmp.path().join("i.sqlite"), "c").await.unwrap();
        index
            .upsert(&[
                record("f", vec![1.0, 0.0], "function", "x.py"),
                record("k", vec![1.0, 0.0], "class", "x.py"),
            ])
            .await
            .unwrap();
        let filter = MetadataFilter::chunk_type("class");
        let hits = index.query(&[1.0, 0.0], 5, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "k");

        assert!(index.query(&[1.0, 0.0, 0.0], 5, None).await.is_err());
        assert!(index
            .upsert(&[record("z", vec![1.0], "function", "x.py")])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn collections_are_isolated_and_clearable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("i.sqlite");
        let a = SqliteIndex::open_path(&path, "a").await.unwrap();
        a.upsert(&[record("x", vec![1.0, 0.0], "function", "x.py")]).await.unwrap();
        a.close().await;

        let b = SqliteIndex::open_path(&path, "b").await.unwrap();
        assert_eq!(b.count().await.unwrap(), 0);
        assert!(b.query(&[1.0, 0.0, 0.0], 1, None).await.unwrap().is_empty());
        b.close().await;

        let a = SqliteIndex::open_path(&path, "a").await.unwrap();
        a.clear().await.unwrap();
        assert_eq!(a.count().await.unwrap(), 0);
        a.upsert(&[record("y", vec![1.0, 0.0, 0.0], "module", "m.py")]).await.unwrap();
        assert_eq!(a.stats().await.unwrap().dims, Some(3));
    }
}
