//! # chartmine
//!
//! Clinical findings extraction over a patient's record: ingest a
//! document into a Postgres-backed vector store, then run a three-stage
//! pipeline — retrieve supporting evidence, extract major conditions
//! with a task model, and review the extraction with a second model
//! pass.
//!
//! ## Data flow
//!
//! ```text
//! document ──chunk──▶ embeddings ──▶ Postgres (BYTEA blobs)
//!
//! query ──formulate──▶ search ──filter──▶ context
//!       ──extract──▶ {major_conditions} ──review──▶ {verdict, comment}
//! ```
//!
//! ## Modules
//!
//! - [`config`] — environment-variable configuration
//! - [`models`] — chunks, similarity hits, extraction and review types
//! - [`chunk`] — separator-priority chunker with overlap
//! - [`embedding`] — Ollama/OpenAI embedders and vector utilities
//! - [`llm`] — chat model client and schema-validated JSON decoding
//! - [`db`] / [`migrate`] — Postgres pool and schema
//! - [`store`] / [`pg_store`] — vector store trait and implementations
//! - [`ingest`] — chunk + embed + store a document
//! - [`retrieval`] / [`extract`] / [`review`] — the three pipeline stages
//! - [`pipeline`] — stage orchestration and error tagging

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod pg_store;
pub mod pipeline;
pub mod retrieval;
pub mod review;
pub mod store;
