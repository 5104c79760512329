//! Document ingestion: chunk, embed, and store a patient document.
//!
//! Ingestion replaces any previous upload under the same source so that
//! a document can be re-ingested without leaving stale chunks behind.
//! Before doing any work it probes the embedding backend with a tiny
//! healthcheck input, so a misconfigured backend fails fast instead of
//! after chunking a large file.

use anyhow::{bail, Context, Result};

use crate::chunk::chunk_text;
use crate::embedding::Embedder;
use crate::store::VectorStore;

/// Outcome of one ingestion run.
#[derive(Debug)]
pub struct IngestReport {
    pub source: String,
    pub chunks_stored: usize,
}

impl IngestReport {
    pub fn message(&self) -> String {
        format!("Stored {} chunks under '{}'.", self.chunks_stored, self.source)
    }
}

/// Chunk `text`, embed every chunk, and store the result under `source`,
/// replacing any chunks previously stored there.
pub async fn ingest_text(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    source: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<IngestReport> {
    // Probe before chunking: an empty vector means the backend is
    // misconfigured, not busy.
    let probe = embedder
        .embed(&["healthcheck".to_string()])
        .await
        .context("Embedding backend probe failed")?;
    if probe.first().map_or(true, |v| v.is_empty()) {
        bail!(
            "Embedding backend returned an empty vector for model '{}'. \
             Verify model access and credentials.",
            embedder.model_name()
        );
    }

    let chunks = chunk_text(source, text, chunk_size, chunk_overlap);

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder
        .embed(&texts)
        .await
        .with_context(|| format!("Failed to embed {} chunks", chunks.len()))?;

    if embeddings.len() != chunks.len() {
        bail!(
            "Embedding backend returned {} vectors for {} chunks",
            embeddings.len(),
            chunks.len()
        );
    }

    store
        .delete_source(source)
        .await
        .with_context(|| format!("Failed to clear previous chunks for '{}'", source))?;

    store
        .insert_chunks(&chunks, &embeddings)
        .await
        .with_context(|| format!("Failed to store chunks for '{}'", source))?;

    Ok(IngestReport {
        source: source.to_string(),
        chunks_stored: chunks.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::store::VectorStore;
    use async_trait::async_trait;

    struct FixedEmbedder {
        dim: usize,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    (0..self.dim)
                        .map(|i| ((t.len() + i) % 7) as f32)
                        .collect()
                })
                .collect())
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn model_name(&self) -> &str {
            "broken"
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| Vec::new()).collect())
        }
    }

    #[tokio::test]
    async fn test_ingest_stores_chunks() {
        let store = InMemoryStore::new();
        let embedder = FixedEmbedder { dim: 4 };
        let text = "First paragraph about symptoms.\n\nSecond paragraph about treatment.";

        let report = ingest_text(&store, &embedder, "notes.txt", text, 40, 0)
            .await
            .unwrap();

        assert!(report.chunks_stored > 1);
        assert_eq!(
            store.count_chunks(Some("notes.txt")).await.unwrap(),
            report.chunks_stored as i64
        );
        assert!(report.message().contains("notes.txt"));
    }

    #[tokio::test]
    async fn test_reingest_replaces_previous_upload() {
        let store = InMemoryStore::new();
        let embedder = FixedEmbedder { dim: 4 };

        ingest_text(
            &store,
            &embedder,
            "notes.txt",
            "one\n\ntwo\n\nthree\n\nfour",
            5,
            0,
        )
        .await
        .unwrap();
        let report = ingest_text(&store, &embedder, "notes.txt", "short", 500, 0)
            .await
            .unwrap();

        assert_eq!(report.chunks_stored, 1);
        assert_eq!(store.count_chunks(Some("notes.txt")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_embeddings_fail_before_storing() {
        let store = InMemoryStore::new();
        let err = ingest_text(&store, &BrokenEmbedder, "notes.txt", "some text", 500, 0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty vector"));
        assert_eq!(store.count_chunks(None).await.unwrap(), 0);
    }
}
