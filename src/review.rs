//! Extraction review stage.
//!
//! A second model pass audits the extraction against the retrieved
//! context and returns a binary verdict. Before calling the model, a
//! deterministic preflight lint flags the two mechanical problems a
//! model reviewer is most likely to gloss over: condition names with no
//! trace in the context, and malformed dates. Preflight findings are
//! injected into the reviewer prompt so the model cannot miss them.

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::llm::{complete_json, ChatMessage, ChatModel, ChatRequest};
use crate::models::{Extraction, Review};

const REVIEW_PROMPT: &str = "You are a careful reviewer of clinical data extraction. \
You are given the retrieved patient context, the task that was asked, and the \
extraction produced from it.

Check:
1. Every extracted condition is supported by the context. Flag invented conditions.
2. No prominent major or chronic condition in the context is missing.
3. Dates are MM-DD-YYYY or an honest marker (\"unknown\", \"ongoing\").
4. Status values are consistent with the dates.

Reply with ONLY a JSON object of this exact shape and nothing else:
{\"verdict\": \"ok\" or \"needs_fix\", \"comment\": \"2-3 short lines explaining the verdict\"}";

/// Markers accepted in place of a concrete date.
const DATE_MARKERS: [&str; 4] = ["unknown", "unclear", "ongoing", ""];

fn date_is_acceptable(date: &str) -> bool {
    let lower = date.trim().to_lowercase();
    if DATE_MARKERS.contains(&lower.as_str()) {
        return true;
    }
    NaiveDate::parse_from_str(date.trim(), "%m-%d-%Y").is_ok()
}

/// Deterministic lint over an extraction: returns one finding per
/// condition key that does not appear in the context (case-insensitive)
/// and per date that is neither `MM-DD-YYYY` nor an accepted marker.
pub fn preflight(context: &str, extraction: &Extraction) -> Vec<String> {
    let context_lower = context.to_lowercase();
    let mut findings = Vec::new();

    for condition in &extraction.major_conditions {
        if !context_lower.contains(&condition.key.to_lowercase()) {
            findings.push(format!(
                "Condition '{}' does not appear in the retrieved context.",
                condition.key
            ));
        }
        if !date_is_acceptable(&condition.start_date) {
            findings.push(format!(
                "Condition '{}' has a malformed start_date: '{}'.",
                condition.key, condition.start_date
            ));
        }
        if !date_is_acceptable(&condition.end_date) {
            findings.push(format!(
                "Condition '{}' has a malformed end_date: '{}'.",
                condition.key, condition.end_date
            ));
        }
    }

    findings
}

/// Review an extraction against the context it was produced from.
pub async fn review(
    chat: &dyn ChatModel,
    model: &str,
    task_prompt: &str,
    patient_context: &str,
    extraction: &Extraction,
    schema_retries: u32,
) -> Result<Review> {
    let extraction_json = serde_json::to_string_pretty(extraction)
        .context("Failed to serialize extraction for review")?;

    let findings = preflight(patient_context, extraction);
    let findings_block = if findings.is_empty() {
        String::new()
    } else {
        format!(
            "\n\nAutomated checks flagged the following; weigh them in your verdict:\n- {}",
            findings.join("\n- ")
        )
    };

    let user_message = format!(
        "Task:\n{}\n\nRetrieved patient context:\n{}\n\nExtraction to review:\n{}{}",
        task_prompt, patient_context, extraction_json, findings_block
    );

    let request = ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(REVIEW_PROMPT),
            ChatMessage::user(user_message),
        ],
        temperature: 0.2,
        max_tokens: Some(600),
        json_mode: true,
    };

    complete_json(chat, request, schema_retries)
        .await
        .context("Extraction review failed")
}
