//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the persistence seam: the Postgres
//! implementation lives in [`crate::pg_store`], and [`memory`] holds an
//! in-memory implementation used by the integration tests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChunkRecord, SimilarityHit};

/// Persistence seam for chunk embeddings.
///
/// Implementations must keep `(source, chunk_index)` unique and return
/// search results ordered by descending score. Search applies no score
/// floor of its own; thresholding belongs to the retrieval filter.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store chunks alongside their embeddings. `chunks` and
    /// `embeddings` are parallel slices of equal length.
    async fn insert_chunks(
        &self,
        chunks: &[ChunkRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<()>;

    /// Delete every chunk stored under `source`. Returns the number of
    /// chunks removed.
    async fn delete_source(&self, source: &str) -> Result<u64>;

    /// Return the `k` most similar chunks to `query_vec`, ordered by
    /// descending score. When `source` is given, only chunks whose
    /// source matches exactly are considered.
    async fn vector_search(
        &self,
        query_vec: &[f32],
        k: i64,
        source: Option<&str>,
    ) -> Result<Vec<SimilarityHit>>;

    /// Count stored chunks, optionally restricted to one source.
    async fn count_chunks(&self, source: Option<&str>) -> Result<i64>;
}
