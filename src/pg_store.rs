//! Postgres-backed vector store.
//!
//! Embeddings are stored as little-endian f32 BYTEA blobs next to the
//! chunk text. Similarity search fetches candidate rows (optionally
//! filtered by source) and scores them in Rust with a brute-force cosine
//! scan; corpora here are single patient documents, so a linear scan is
//! the right tool.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::embedding::{blob_to_vec, cosine_similarity, similarity_score, vec_to_blob};
use crate::models::{ChunkRecord, SimilarityHit};
use crate::store::VectorStore;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap a caller-owned pool. The store never opens or closes
    /// connections itself.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_chunk(row: &PgRow) -> ChunkRecord {
        ChunkRecord {
            id: row.get("id"),
            source: row.get("source"),
            chunk_index: row.get("chunk_index"),
            text: row.get("text"),
            hash: row.get("hash"),
            uploaded_at: row.get("uploaded_at"),
        }
    }
}

#[async_trait]
impl VectorStore for PgStore {
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

        let mut tx = self.pool.begin().await.context("Failed to begin insert")?;

        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            sqlx::query(
                "INSERT INTO chunks (id, source, chunk_index, text, hash, uploaded_at, embedding)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (source, chunk_index) DO UPDATE
                 SET id = EXCLUDED.id, text = EXCLUDED.text, hash = EXCLUDED.hash,
                     uploaded_at = EXCLUDED.uploaded_at, embedding = EXCLUDED.embedding",
            )
            .bind(&chunk.id)
            .bind(&chunk.source)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(chunk.uploaded_at)
            .bind(vec_to_blob(embedding))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert chunk {}", chunk.chunk_index))?;
        }

        tx.commit().await.context("Failed to commit insert")?;
        Ok(())
    }

    async fn delete_source(&self, source: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE source = $1")
            .bind(source)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete chunks for '{}'", source))?;
        Ok(result.rows_affected())
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        k: i64,
        source: Option<&str>,
    ) -> Result<Vec<SimilarityHit>> {
        let rows = match source {
            Some(src) => {
                sqlx::query(
                    "SELECT id, source, chunk_index, text, hash, uploaded_at, embedding
                     FROM chunks WHERE source = $1",
                )
                .bind(src)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT id, source, chunk_index, text, hash, uploaded_at, embedding
                     FROM chunks",
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to fetch chunks for similarity search")?;

        let mut hits: Vec<SimilarityHit> = rows
            .iter()
            .map(|row| {
                let embedding = blob_to_vec(row.get::<Vec<u8>, _>("embedding").as_slice());
                SimilarityHit {
                    chunk: Self::row_to_chunk(row),
                    score: Some(similarity_score(cosine_similarity(query_vec, &embedding))),
                }
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
        let count: i64 = match source {
            Some(src) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE source = $1")
                    .bind(src)
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .context("Failed to count chunks")?;
        Ok(count)
    }
}
