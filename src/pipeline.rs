//! The retrieve → extract → review pipeline.
//!
//! Stages run strictly in order; the first failure halts the run and is
//! reported as a [`StageError`] naming the stage it came from. The
//! retrieved context can optionally be written to a side file for
//! inspection before extraction begins.

use std::path::Path;
use thiserror::Error;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::extract::extract;
use crate::llm::ChatModel;
use crate::models::{Extraction, Review};
use crate::retrieval::RetrievalAgent;
use crate::review::review;
use crate::store::VectorStore;

/// A pipeline failure tagged with the stage that produced it.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Retrieval stage failed: {0}")]
    Retrieval(#[source] anyhow::Error),

    #[error("Extraction stage failed: {0}")]
    Extraction(#[source] anyhow::Error),

    #[error("Review stage failed: {0}")]
    Review(#[source] anyhow::Error),
}

/// Everything a completed run produced.
#[derive(Debug)]
pub struct PipelineReport {
    /// The assembled patient context (may be empty).
    pub context: String,
    pub extraction: Extraction,
    pub review: Review,
}

pub struct Pipeline<'a> {
    pub store: &'a dyn VectorStore,
    pub embedder: &'a dyn Embedder,
    pub chat: &'a dyn ChatModel,
    pub config: &'a Config,
}

impl<'a> Pipeline<'a> {
    /// Run all three stages for one query against one source document.
    ///
    /// When `context_file` is given, the retrieved context is written
    /// there between the retrieval and extraction stages.
    pub async fn run(
        &self,
        user_query: &str,
        source: &str,
        context_file: Option<&Path>,
    ) -> Result<PipelineReport, StageError> {
        let agent = RetrievalAgent {
            store: self.store,
            embedder: self.embedder,
            chat: self.chat,
            model: &self.config.models.retrieval_model,
            top_k: self.config.retrieval.top_k,
            threshold: self.config.retrieval.similarity_threshold,
            schema_retries: self.config.retrieval.schema_retries,
        };

        let context = agent
            .retrieve(user_query, source)
            .await
            .map_err(StageError::Retrieval)?;

        if let Some(path) = context_file {
            std::fs::write(path, &context)
                .map_err(|e| StageError::Retrieval(anyhow::Error::new(e).context(format!(
                    "Failed to write context file {}",
                    path.display()
                ))))?;
        }

        let extraction = extract(
            self.chat,
            &self.config.models.task_model,
            &context,
            self.config.retrieval.schema_retries,
        )
        .await
        .map_err(StageError::Extraction)?;

        let review = review(
            self.chat,
            &self.config.models.task_model,
            user_query,
            &context,
            &extraction,
            self.config.retrieval.schema_retries,
        )
        .await
        .map_err(StageError::Review)?;

        Ok(PipelineReport {
            context,
            extraction,
            review,
        })
    }
}
