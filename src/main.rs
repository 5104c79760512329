use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use chartmine::config::Config;
use chartmine::db;
use chartmine::embedding::{create_embedder, embed_query};
use chartmine::ingest::ingest_text;
use chartmine::llm::HttpChatModel;
use chartmine::migrate::run_migrations;
use chartmine::models::Verdict;
use chartmine::pg_store::PgStore;
use chartmine::pipeline::Pipeline;
use chartmine::store::VectorStore;

const DEFAULT_QUERY: &str = "Identify the patient's major and chronic medical conditions, \
with supporting details, start and end dates, and whether each is ongoing or cleaned up.";

#[derive(Parser)]
#[command(name = "chartmine")]
#[command(about = "Extract and review clinical findings from patient records")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,

    /// Chunk, embed, and store a patient document
    Ingest {
        /// Path to the document to ingest
        file: PathBuf,

        /// Source identifier to store the chunks under (defaults to the file path)
        #[arg(long)]
        source: Option<String>,
    },

    /// Run a raw similarity search (debugging aid)
    Search {
        /// Query text to embed and search with
        query: String,

        /// Restrict the search to one source document
        #[arg(long)]
        source: Option<String>,
    },

    /// Run the retrieve → extract → review pipeline
    Run {
        /// Source document to run against
        #[arg(long)]
        source: String,

        /// Task description for the pipeline
        #[arg(long, default_value = DEFAULT_QUERY)]
        query: String,

        /// Write the retrieved context to this file before extraction
        #[arg(long)]
        context_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = db::connect(&config.db).await?;
    let result = dispatch(cli.command, &config, &pool).await;
    pool.close().await;
    result
}

async fn dispatch(command: Commands, config: &Config, pool: &sqlx::PgPool) -> Result<()> {
    match command {
        Commands::Init => {
            run_migrations(pool).await?;
            println!("Database initialized successfully.");
        }

        Commands::Ingest { file, source } => {
            let source = source.unwrap_or_else(|| file.display().to_string());
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let store = PgStore::new(pool.clone());
            let embedder = create_embedder(config)?;

            let report = ingest_text(
                &store,
                embedder.as_ref(),
                &source,
                &text,
                config.chunking.chunk_size,
                config.chunking.chunk_overlap,
            )
            .await?;
            println!("{}", report.message());
        }

        Commands::Search { query, source } => {
            let store = PgStore::new(pool.clone());
            let embedder = create_embedder(config)?;

            let query_vec = embed_query(embedder.as_ref(), &query).await?;
            let hits = store
                .vector_search(&query_vec, config.retrieval.top_k, source.as_deref())
                .await?;

            if hits.is_empty() {
                println!("No chunks found.");
                return Ok(());
            }

            for hit in &hits {
                let score = hit
                    .score
                    .map(|s| format!("{:.4}", s))
                    .unwrap_or_else(|| "n/a".to_string());
                println!(
                    "[{}] {} #{}\n{}\n",
                    score, hit.chunk.source, hit.chunk.chunk_index, hit.chunk.text
                );
            }

            let context =
                chartmine::retrieval::filter_and_join(&hits, config.retrieval.similarity_threshold);
            println!("======= Assembled Context =======");
            if context.is_empty() {
                println!("(no hits passed the similarity filter)");
            } else {
                println!("{}", context);
            }
        }

        Commands::Run {
            source,
            query,
            context_file,
        } => {
            let store = PgStore::new(pool.clone());
            let embedder = create_embedder(config)?;
            let chat = HttpChatModel::new(&config.models, &config.http)?;

            let pipeline = Pipeline {
                store: &store,
                embedder: embedder.as_ref(),
                chat: &chat,
                config,
            };

            let report = pipeline
                .run(&query, &source, context_file.as_deref())
                .await?;

            println!("======= Retrieved Context =======");
            if report.context.is_empty() {
                println!("(no evidence passed the similarity filter)");
            } else {
                println!("{}", report.context);
            }

            println!("\n======= Extraction Result =======");
            println!("{}", serde_json::to_string_pretty(&report.extraction)?);

            println!("\n======= Review =======");
            match report.review.verdict {
                Verdict::Ok => println!("Verdict: ok"),
                Verdict::NeedsFix => println!("Verdict: needs_fix"),
            }
            println!("{}", report.review.comment);
        }
    }

    Ok(())
}
