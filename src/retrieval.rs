//! Evidence retrieval stage.
//!
//! The retrieval agent turns the user's request into one focused
//! semantic search query (via the retrieval model), embeds it, searches
//! the vector store restricted to the patient's source document, and
//! assembles the retained chunk texts into a single context string.
//!
//! The filter is strict: a hit survives only when it carries a score at
//! or above the threshold. A hit with no score is dropped. An empty
//! context string is a valid outcome meaning "no evidence found" — it
//! is not an error.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::embedding::{embed_query, Embedder};
use crate::llm::{complete_json, ChatMessage, ChatModel, ChatRequest};
use crate::models::SimilarityHit;
use crate::store::VectorStore;

/// Default floor applied to similarity scores.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

const QUERY_PROMPT: &str = "You are a retrieval assistant for clinical records. \
Given a task description, produce ONE focused semantic search query that would \
surface the most relevant passages of a patient's record. \
Reply with ONLY a JSON object of the form {\"query\": \"...\"} and nothing else.";

/// The retrieval model's reply shape.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchPlan {
    pub query: String,
}

/// Drop hits without a score or below `threshold`, then join the
/// surviving chunk texts with blank lines, preserving input order.
pub fn filter_and_join(hits: &[SimilarityHit], threshold: f64) -> String {
    hits.iter()
        .filter(|h| h.score.map_or(false, |s| s >= threshold))
        .map(|h| h.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Retrieval stage: query formulation, similarity search, and context
/// assembly.
pub struct RetrievalAgent<'a> {
    pub store: &'a dyn VectorStore,
    pub embedder: &'a dyn Embedder,
    pub chat: &'a dyn ChatModel,
    pub model: &'a str,
    pub top_k: i64,
    pub threshold: f64,
    pub schema_retries: u32,
}

impl<'a> RetrievalAgent<'a> {
    /// Ask the retrieval model to turn the user's request into a single
    /// search query.
    pub async fn formulate_query(&self, user_query: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.to_string(),
            messages: vec![
                ChatMessage::system(QUERY_PROMPT),
                ChatMessage::user(user_query.to_string()),
            ],
            temperature: 0.0,
            max_tokens: Some(200),
            json_mode: true,
        };

        let plan: SearchPlan = complete_json(self.chat, request, self.schema_retries)
            .await
            .context("Failed to formulate search query")?;
        Ok(plan.query)
    }

    /// Run the full retrieval stage and return the assembled context.
    /// Chunk texts are passed through verbatim; the caller sees exactly
    /// what the store returned.
    pub async fn retrieve(&self, user_query: &str, source: &str) -> Result<String> {
        let query = self.formulate_query(user_query).await?;

        let query_vec = embed_query(self.embedder, &query)
            .await
            .context("Failed to embed search query")?;

        let hits = self
            .store
            .vector_search(&query_vec, self.top_k, Some(source))
            .await
            .context("Similarity search failed")?;

        Ok(filter_and_join(&hits, self.threshold))
    }
}
