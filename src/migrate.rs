//! Schema migrations.
//!
//! A single idempotent migration creates the `chunks` table and its
//! source index. Safe to run on every startup.

use anyhow::{Context, Result};
use sqlx::PgPool;

const CREATE_CHUNKS: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    chunk_index BIGINT NOT NULL,
    text TEXT NOT NULL,
    hash TEXT NOT NULL,
    uploaded_at BIGINT NOT NULL,
    embedding BYTEA NOT NULL,
    UNIQUE (source, chunk_index)
)
"#;

const CREATE_SOURCE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks (source)";

/// Create the schema if it does not exist yet.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query(CREATE_CHUNKS)
        .execute(pool)
        .await
        .context("Failed to create chunks table")?;

    sqlx::query(CREATE_SOURCE_INDEX)
        .execute(pool)
        .await
        .context("Failed to create source index")?;

    Ok(())
}
