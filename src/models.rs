//! Core data models used throughout chartmine.
//!
//! These types represent the chunks, similarity results, and structured
//! clinical findings that flow through the retrieve → extract → review
//! pipeline.

use serde::{Deserialize, Serialize};

/// A bounded span of a patient document, stored with metadata for later
/// semantic retrieval. Immutable once stored; owned by the vector store.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// Chunk UUID.
    pub id: String,
    /// Exact identifier of the source document (used for metadata filtering).
    pub source: String,
    /// Position of this chunk within the document, starting at 0.
    pub chunk_index: i64,
    /// Chunk text content.
    pub text: String,
    /// SHA-256 of the text content.
    pub hash: String,
    /// Unix timestamp of ingestion.
    pub uploaded_at: i64,
}

/// A chunk paired with its similarity score for one query.
///
/// Transient, produced per search call, never persisted. `score` is a
/// similarity in `[0.0, 1.0]`; a backend that cannot score a chunk
/// yields `None`, and the retrieval filter drops such hits.
#[derive(Debug, Clone)]
pub struct SimilarityHit {
    pub chunk: ChunkRecord,
    pub score: Option<f64>,
}

/// Whether a condition is still active or has resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    #[serde(rename = "ongoing")]
    Ongoing,
    #[serde(rename = "cleaned up")]
    CleanedUp,
}

/// One major or chronic medical condition extracted from patient context.
///
/// Dates are `MM-DD-YYYY` strings, or an explicit unknown/unclear marker
/// when the context does not pin them down. The review stage checks date
/// format and evidence support heuristically; no hard date parsing is
/// applied at decode time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionRecord {
    /// Condition name (e.g. "IBS", "Depression", "Diabetes").
    pub key: String,
    /// Brief supporting detail or reason drawn from the context.
    pub value: String,
    /// When the condition was first detected.
    pub start_date: String,
    /// When it cleaned up, or a marker if still ongoing.
    pub end_date: String,
    pub status: ConditionStatus,
}

/// The extraction stage's output: a single list of condition records.
///
/// An empty list is the valid "no major conditions found" result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Extraction {
    pub major_conditions: Vec<ConditionRecord>,
}

/// Binary outcome of the automated review stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "needs_fix")]
    NeedsFix,
}

/// The review stage's output. Exactly two fields; anything else in the
/// model reply is a schema violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Review {
    pub verdict: Verdict,
    /// 2-3 short lines of reviewer commentary.
    pub comment: String,
}
