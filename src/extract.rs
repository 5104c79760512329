//! Condition extraction stage.
//!
//! Feeds the retrieved patient context to the task model and decodes the
//! reply into an [`Extraction`]. Empty context short-circuits to an
//! empty result without ever calling the model: there is nothing to
//! extract from, and an invented condition would be worse than none.

use anyhow::{Context, Result};

use crate::llm::{complete_json, ChatMessage, ChatModel, ChatRequest};
use crate::models::Extraction;

const EXTRACTION_PROMPT: &str = "You are a clinical data analyst. Below is retrieved \
context from a patient's medical record:

{patient_info}

From this context only, identify the patient's MAJOR or CHRONIC medical conditions. \
Ignore minor or transient complaints (colds, isolated headaches, routine checkups).

For each condition report:
- \"key\": the condition name (e.g. \"IBS\", \"Depression\", \"Diabetes\")
- \"value\": a brief supporting detail or reason drawn from the context
- \"start_date\": when the condition was first detected, as MM-DD-YYYY, or \
\"unknown\" if the context does not say
- \"end_date\": when it cleaned up as MM-DD-YYYY, or \"ongoing\" if it has not
- \"status\": exactly \"ongoing\" or \"cleaned up\"

Reply with ONLY a JSON object of this exact shape and nothing else:
{\"major_conditions\": [{\"key\": \"...\", \"value\": \"...\", \"start_date\": \"...\", \
\"end_date\": \"...\", \"status\": \"...\"}]}

If no major or chronic conditions are found, reply with:
{\"major_conditions\": []}";

/// Extract major conditions from the retrieved context.
///
/// Returns an empty [`Extraction`] without a model call when the context
/// is empty or whitespace-only.
pub async fn extract(
    chat: &dyn ChatModel,
    model: &str,
    patient_context: &str,
    schema_retries: u32,
) -> Result<Extraction> {
    if patient_context.trim().is_empty() {
        return Ok(Extraction {
            major_conditions: Vec::new(),
        });
    }

    let prompt = EXTRACTION_PROMPT.replace("{patient_info}", patient_context);

    let request = ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::user(prompt)],
        temperature: 0.3,
        max_tokens: Some(2500),
        json_mode: true,
    };

    complete_json(chat, request, schema_retries)
        .await
        .context("Condition extraction failed")
}
