//! Environment-variable configuration.
//!
//! All settings come from the process environment with local-only
//! defaults: a Postgres instance on localhost and an Ollama endpoint for
//! both chat and embeddings. Configuration errors are fatal at startup —
//! [`Config::from_env`] validates everything up front and never retries.

use anyhow::{bail, Context, Result};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub models: ModelConfig,
    pub embedding: EmbedConfig,
    pub retrieval: RetrievalConfig,
    pub chunking: ChunkingConfig,
    pub http: HttpConfig,
}

/// Postgres connection parameters.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    /// TLS mode: `disable`, `prefer`, or `require`.
    pub sslmode: String,
}

/// Chat model endpoint and model identifiers.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// OpenAI-compatible base URL (e.g. `http://localhost:11434/v1`).
    pub base_url: String,
    pub api_key: String,
    /// Model used to formulate the semantic search query.
    pub retrieval_model: String,
    /// Model used for extraction and review.
    pub task_model: String,
}

#[derive(Debug, Clone)]
pub struct EmbedConfig {
    /// `ollama` or `openai`.
    pub provider: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Similarity search candidate count.
    pub top_k: i64,
    /// Retrieval filter floor, in `[0.0, 1.0]`.
    pub similarity_threshold: f64,
    /// Corrective re-prompts allowed per JSON-decoded model call.
    pub schema_retries: u32,
}

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Read and validate configuration from the environment.
    pub fn from_env() -> Result<Config> {
        let config = Config {
            db: DbConfig {
                host: env_or("DB_HOST", "localhost"),
                port: env_parse("DB_PORT", 5432)?,
                name: env_or("DB_NAME", "postgres"),
                user: env_or("DB_USER", "postgres"),
                password: env_or("DB_PASSWORD", ""),
                sslmode: env_or("DB_SSLMODE", "prefer"),
            },
            models: ModelConfig {
                base_url: env_or("MODEL_BASE_URL", "http://localhost:11434/v1"),
                api_key: env_or("MODEL_API_KEY", "ollama"),
                retrieval_model: env_or("RETRIEVAL_MODEL", "llama3.2"),
                task_model: env_or("TASK_MODEL", "llama3.2"),
            },
            embedding: EmbedConfig {
                provider: env_or("EMBED_PROVIDER", "ollama"),
                base_url: env_or("EMBED_BASE_URL", "http://localhost:11434"),
                model: env_or("EMBED_MODEL", "nomic-embed-text"),
            },
            retrieval: RetrievalConfig {
                top_k: env_parse("TOP_K", 5)?,
                similarity_threshold: env_parse("SIMILARITY_THRESHOLD", 0.8)?,
                schema_retries: env_parse("SCHEMA_RETRIES", 1)?,
            },
            chunking: ChunkingConfig {
                chunk_size: env_parse("CHUNK_SIZE", 500)?,
                chunk_overlap: env_parse("CHUNK_OVERLAP", 100)?,
            },
            http: HttpConfig {
                timeout_secs: env_parse("HTTP_TIMEOUT_SECS", 60)?,
                max_retries: env_parse("HTTP_MAX_RETRIES", 3)?,
            },
        };

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("CHUNK_SIZE must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!("CHUNK_OVERLAP must be smaller than CHUNK_SIZE");
        }
        if self.retrieval.top_k < 1 {
            bail!("TOP_K must be >= 1");
        }
        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            bail!("SIMILARITY_THRESHOLD must be in [0.0, 1.0]");
        }
        match self.embedding.provider.as_str() {
            "ollama" | "openai" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be ollama or openai.",
                other
            ),
        }
        match self.db.sslmode.as_str() {
            "disable" | "prefer" | "require" => {}
            other => bail!(
                "Unknown DB_SSLMODE: '{}'. Must be disable, prefer, or require.",
                other
            ),
        }
        Ok(())
    }
}
