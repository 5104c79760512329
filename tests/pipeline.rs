//! End-to-end pipeline tests against the in-memory store with a
//! scripted chat model and a deterministic letter-frequency embedder.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use chartmine::config::{
    ChunkingConfig, Config, DbConfig, EmbedConfig, HttpConfig, ModelConfig, RetrievalConfig,
};
use chartmine::embedding::Embedder;
use chartmine::ingest::ingest_text;
use chartmine::llm::{ChatModel, ChatRequest, LlmError};
use chartmine::models::{ConditionStatus, Verdict};
use chartmine::pipeline::{Pipeline, StageError};
use chartmine::review::preflight;
use chartmine::store::memory::InMemoryStore;
use chartmine::store::VectorStore;

/// Embeds text as a 26-dim letter-frequency vector. Identical texts get
/// identical vectors, so a verbatim query scores 1.0 against its chunk.
struct LetterFreqEmbedder;

#[async_trait]
impl Embedder for LetterFreqEmbedder {
    fn model_name(&self) -> &str {
        "letter-freq"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut counts = vec![0.0f32; 26];
                for c in t.to_lowercase().chars() {
                    if c.is_ascii_lowercase() {
                        counts[(c as u8 - b'a') as usize] += 1.0;
                    }
                }
                counts
            })
            .collect())
    }
}

/// Returns canned replies in order; fails when the script runs out.
struct ScriptedChat {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedChat {
    fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
        }
    }

    fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, _request: &ChatRequest) -> Result<String, LlmError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::Transport("Scripted chat ran out of replies".into()))
    }
}

fn test_config(threshold: f64) -> Config {
    Config {
        db: DbConfig {
            host: "localhost".into(),
            port: 5432,
            name: "postgres".into(),
            user: "postgres".into(),
            password: String::new(),
            sslmode: "prefer".into(),
        },
        models: ModelConfig {
            base_url: "http://localhost:11434/v1".into(),
            api_key: "test".into(),
            retrieval_model: "retrieval-model".into(),
            task_model: "task-model".into(),
        },
        embedding: EmbedConfig {
            provider: "ollama".into(),
            base_url: "http://localhost:11434".into(),
            model: "letter-freq".into(),
        },
        retrieval: RetrievalConfig {
            top_k: 5,
            similarity_threshold: threshold,
            schema_retries: 1,
        },
        chunking: ChunkingConfig {
            chunk_size: 200,
            chunk_overlap: 0,
        },
        http: HttpConfig {
            timeout_secs: 60,
            max_retries: 0,
        },
    }
}

const RECORD: &str = "Patient has a long history of asthma, first diagnosed in 2019. \
Uses an inhaler daily and symptoms remain ongoing.\n\n\
Patient reported a mild cold in January which resolved within a week.\n\n\
Depression was diagnosed in 2021 and treatment with sertraline continues.";

async fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    ingest_text(&store, &LetterFreqEmbedder, "record.txt", RECORD, 200, 0)
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn ingest_then_search_finds_verbatim_paragraph() {
    let store = seeded_store().await;
    assert!(store.count_chunks(Some("record.txt")).await.unwrap() >= 2);

    let query = "Depression was diagnosed in 2021 and treatment with sertraline continues.";
    let query_vec = LetterFreqEmbedder
        .embed(&[query.to_string()])
        .await
        .unwrap()
        .remove(0);
    let hits = store
        .vector_search(&query_vec, 3, Some("record.txt"))
        .await
        .unwrap();

    assert!(!hits.is_empty());
    assert!(hits[0].chunk.text.contains("Depression"));
    assert!(hits[0].score.unwrap() > 0.99);
}

#[tokio::test]
async fn full_pipeline_happy_path() {
    let store = seeded_store().await;
    let config = test_config(0.5);

    let chat = ScriptedChat::new(vec![
        r#"{"query": "major chronic conditions asthma depression diagnosis treatment"}"#,
        r#"{"major_conditions": [
            {"key": "Asthma", "value": "diagnosed 2019, daily inhaler",
             "start_date": "01-01-2019", "end_date": "ongoing", "status": "ongoing"},
            {"key": "Depression", "value": "diagnosed 2021, on sertraline",
             "start_date": "unknown", "end_date": "ongoing", "status": "ongoing"}
        ]}"#,
        r#"{"verdict": "ok", "comment": "Both conditions are supported by the context.\nDates honestly marked unknown."}"#,
    ]);

    let context_file = tempfile::NamedTempFile::new().unwrap();

    let pipeline = Pipeline {
        store: &store,
        embedder: &LetterFreqEmbedder,
        chat: &chat,
        config: &config,
    };

    let report = pipeline
        .run("Find major conditions", "record.txt", Some(context_file.path()))
        .await
        .unwrap();

    assert!(!report.context.is_empty());
    assert_eq!(report.extraction.major_conditions.len(), 2);
    assert_eq!(report.extraction.major_conditions[0].key, "Asthma");
    assert_eq!(report.extraction.major_conditions[0].start_date, "01-01-2019");
    assert_eq!(
        report.extraction.major_conditions[0].status,
        ConditionStatus::Ongoing
    );
    assert_eq!(report.review.verdict, Verdict::Ok);
    assert_eq!(chat.remaining(), 0);

    let written = std::fs::read_to_string(context_file.path()).unwrap();
    assert_eq!(written, report.context);
}

#[tokio::test]
async fn reviewer_can_return_needs_fix() {
    let store = seeded_store().await;
    let config = test_config(0.5);

    let chat = ScriptedChat::new(vec![
        r#"{"query": "chronic conditions"}"#,
        r#"{"major_conditions": [
            {"key": "Diabetes", "value": "invented",
             "start_date": "01-01-2020", "end_date": "ongoing", "status": "ongoing"}
        ]}"#,
        r#"{"verdict": "needs_fix", "comment": "Diabetes is not mentioned anywhere in the context."}"#,
    ]);

    let pipeline = Pipeline {
        store: &store,
        embedder: &LetterFreqEmbedder,
        chat: &chat,
        config: &config,
    };

    let report = pipeline
        .run("Find major conditions", "record.txt", None)
        .await
        .unwrap();

    assert_eq!(report.review.verdict, Verdict::NeedsFix);

    // The deterministic lint catches the invented condition too.
    let findings = preflight(&report.context, &report.extraction);
    assert!(findings.iter().any(|f| f.contains("Diabetes")));
}

#[tokio::test]
async fn reviewer_sees_extraction_that_omits_a_prominent_condition() {
    let store = seeded_store().await;
    let config = test_config(0.5);

    // Extraction misses Depression even though the context mentions it;
    // the scripted reviewer flags the omission.
    let chat = ScriptedChat::new(vec![
        r#"{"query": "chronic conditions"}"#,
        r#"{"major_conditions": [
            {"key": "Asthma", "value": "diagnosed 2019",
             "start_date": "01-01-2019", "end_date": "ongoing", "status": "ongoing"}
        ]}"#,
        r#"{"verdict": "needs_fix", "comment": "Depression is prominent in the context but missing from the extraction."}"#,
    ]);

    let pipeline = Pipeline {
        store: &store,
        embedder: &LetterFreqEmbedder,
        chat: &chat,
        config: &config,
    };

    let report = pipeline
        .run("Find major conditions", "record.txt", None)
        .await
        .unwrap();

    assert!(report.context.to_lowercase().contains("depression"));
    assert_eq!(report.review.verdict, Verdict::NeedsFix);
    assert!(report.review.comment.contains("Depression"));
}

#[tokio::test]
async fn empty_retrieval_skips_the_extraction_model_call() {
    let store = seeded_store().await;
    // Impossible threshold: nothing passes the filter.
    let config = test_config(1.01);

    // Only two replies: query formulation and review. Extraction must
    // short-circuit without consuming one.
    let chat = ScriptedChat::new(vec![
        r#"{"query": "chronic conditions"}"#,
        r#"{"verdict": "ok", "comment": "Nothing extracted and no context to contradict that."}"#,
    ]);

    let pipeline = Pipeline {
        store: &store,
        embedder: &LetterFreqEmbedder,
        chat: &chat,
        config: &config,
    };

    let report = pipeline
        .run("Find major conditions", "record.txt", None)
        .await
        .unwrap();

    assert!(report.context.is_empty());
    assert!(report.extraction.major_conditions.is_empty());
    assert_eq!(chat.remaining(), 0);
}

#[tokio::test]
async fn malformed_reply_recovers_within_retry_budget() {
    let store = seeded_store().await;
    let config = test_config(0.5);

    let chat = ScriptedChat::new(vec![
        "this is not json",
        r#"{"query": "chronic conditions"}"#,
        r#"{"major_conditions": []}"#,
        r#"{"verdict": "ok", "comment": "Empty extraction is consistent."}"#,
    ]);

    let pipeline = Pipeline {
        store: &store,
        embedder: &LetterFreqEmbedder,
        chat: &chat,
        config: &config,
    };

    let report = pipeline
        .run("Find major conditions", "record.txt", None)
        .await
        .unwrap();
    assert_eq!(report.review.verdict, Verdict::Ok);
    assert_eq!(chat.remaining(), 0);
}

#[tokio::test]
async fn persistent_schema_violation_halts_at_retrieval() {
    let store = seeded_store().await;
    let config = test_config(0.5);

    // Retry budget is 1, so two bad replies exhaust it.
    let chat = ScriptedChat::new(vec!["garbage", "more garbage"]);

    let pipeline = Pipeline {
        store: &store,
        embedder: &LetterFreqEmbedder,
        chat: &chat,
        config: &config,
    };

    let err = pipeline
        .run("Find major conditions", "record.txt", None)
        .await
        .unwrap_err();

    match err {
        StageError::Retrieval(inner) => {
            let chain = format!("{:#}", inner);
            assert!(chain.contains("did not match the expected schema"), "{}", chain);
        }
        other => panic!("expected a retrieval stage error, got {:?}", other),
    }
}
