//! In-memory vector store.
//!
//! Backs the integration tests and any ephemeral usage where Postgres
//! is unavailable. Same brute-force cosine scan as the Postgres store,
//! minus the persistence.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::RwLock;

use crate::embedding::{cosine_similarity, similarity_score};
use crate::models::{ChunkRecord, SimilarityHit};
use crate::store::VectorStore;

#[derive(Default)]
pub struct InMemoryStore {
    rows: RwLock<Vec<(ChunkRecord, Vec<f32>)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn insert_chunks(
        &self,
        chunks: &[ChunkRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        anyhow::ensure!(
            chunks.len() == embeddings.len(),
            "Chunk/embedding count mismatch: {} vs {}",
            chunks.len(),
            embeddings.len()
        );
        let mut rows = self.rows.write().unwrap();
        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            rows.retain(|(c, _)| !(c.source == chunk.source && c.chunk_index == chunk.chunk_index));
            rows.push((chunk.clone(), embedding.clone()));
        }
        Ok(())
    }

    async fn delete_source(&self, source: &str) -> Result<u64> {
        let mut rows = self.rows.write().unwrap();
        let before = rows.len();
        rows.retain(|(c, _)| c.source != source);
        Ok((before - rows.len()) as u64)
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        k: i64,
        source: Option<&str>,
    ) -> Result<Vec<SimilarityHit>> {
        let rows = self.rows.read().unwrap();

        let mut hits: Vec<SimilarityHit> = rows
            .iter()
            .filter(|(c, _)| source.map_or(true, |s| c.source == s))
            .map(|(c, embedding)| SimilarityHit {
                chunk: c.clone(),
                score: Some(similarity_score(cosine_similarity(query_vec, embedding))),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k.max(0) as usize);
        Ok(hits)
    }

    async fn count_chunks(&self, source: Option<&str>) -> Result<i64> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .iter()
            .filter(|(c, _)| source.map_or(true, |s| c.source == s))
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, index: i64, text: &str) -> ChunkRecord {
        ChunkRecord {
            id: format!("{}-{}", source, index),
            source: source.to_string(),
            chunk_index: index,
            text: text.to_string(),
            hash: String::new(),
            uploaded_at: 0,
        }
    }

    #[tokio::test]
    async fn test_insert_and_count() {
        let store = InMemoryStore::new();
        store
            .insert_chunks(
                &[chunk("a.txt", 0, "one"), chunk("a.txt", 1, "two")],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .await
            .unwrap();
        assert_eq!(store.count_chunks(None).await.unwrap(), 2);
        assert_eq!(store.count_chunks(Some("a.txt")).await.unwrap(), 2);
        assert_eq!(store.count_chunks(Some("b.txt")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reinsert_replaces_same_position() {
        let store = InMemoryStore::new();
        store
            .insert_chunks(&[chunk("a.txt", 0, "old")], &[vec![1.0, 0.0]])
            .await
            .unwrap();
        store
            .insert_chunks(&[chunk("a.txt", 0, "new")], &[vec![0.0, 1.0]])
            .await
            .unwrap();
        assert_eq!(store.count_chunks(Some("a.txt")).await.unwrap(), 1);
        let hits = store
            .vector_search(&[0.0, 1.0], 1, Some("a.txt"))
            .await
            .unwrap();
        assert_eq!(hits[0].chunk.text, "new");
    }

    #[tokio::test]
    async fn test_delete_source() {
        let store = InMemoryStore::new();
        store
            .insert_chunks(
                &[chunk("a.txt", 0, "one"), chunk("b.txt", 0, "two")],
                &[vec![1.0], vec![1.0]],
            )
            .await
            .unwrap();
        let deleted = store.delete_source("a.txt").await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count_chunks(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_search_orders_by_score_desc() {
        let store = InMemoryStore::new();
        store
            .insert_chunks(
                &[
                    chunk("a.txt", 0, "exact"),
                    chunk("a.txt", 1, "orthogonal"),
                    chunk("a.txt", 2, "close"),
                ],
                &[
                    vec![1.0, 0.0],
                    vec![0.0, 1.0],
                    vec![0.9, 0.1],
                ],
            )
            .await
            .unwrap();

        let hits = store.vector_search(&[1.0, 0.0], 3, None).await.unwrap();
        assert_eq!(hits[0].chunk.text, "exact");
        assert_eq!(hits[1].chunk.text, "close");
        assert_eq!(hits[2].chunk.text, "orthogonal");
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
    }

    #[tokio::test]
    async fn test_search_filters_by_source() {
        let store = InMemoryStore::new();
        store
            .insert_chunks(
                &[chunk("a.txt", 0, "from a"), chunk("b.txt", 0, "from b")],
                &[vec![1.0, 0.0], vec![1.0, 0.0]],
            )
            .await
            .unwrap();
        let hits = store
            .vector_search(&[1.0, 0.0], 10, Some("b.txt"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.source, "b.txt");
    }

    #[tokio::test]
    async fn test_search_truncates_to_k() {
        let store = InMemoryStore::new();
        let chunks: Vec<ChunkRecord> = (0..10).map(|i| chunk("a.txt", i, "x")).collect();
        let embeddings: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32, 1.0]).collect();
        store.insert_chunks(&chunks, &embeddings).await.unwrap();
        let hits = store.vector_search(&[1.0, 0.0], 3, None).await.unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn test_mismatched_lengths_rejected() {
        let store = InMemoryStore::new();
        let result = store
            .insert_chunks(&[chunk("a.txt", 0, "one")], &[])
            .await;
        assert!(result.is_err());
    }
}
