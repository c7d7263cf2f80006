// SPDX-License-Identifier: Apache-2.0
//! Decides whether the model should keep talking without new user input.
//!
//! Three deterministic pre-rules short-circuit the common cases; anything
//! else falls back to asking the model to classify its own last turn.

use futures::StreamExt;
use orka_model::{CompletionRequest, Content, ModelProvider, Part, ResponseEvent, Role};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextSpeaker {
    User,
    Model,
}

const CHECK_PROMPT: &str = r#"Analyze *only* the content and structure of your immediately preceding response (your last turn in the conversation history). Based *strictly* on that response, determine who should logically speak next: the 'user' or the 'model' (you).
**Decision Rules (apply in order):**
1. **Model Continues:** If your last response explicitly states an immediate next action you intend to take, or indicates an intended tool call that didn't execute, or seems clearly incomplete, then the **'model'** should speak next.
2. **Question to User:** If your last response ends with a direct question addressed to the user, then the **'user'** should speak next.
3. **Waiting for User:** Otherwise, the **'user'** should speak next.
Respond *only* in JSON format: {"reasoning": string, "next_speaker": "user" | "model"}. Do not include any text outside the JSON structure."#;

fn is_function_response_turn(content: &Content) -> bool {
    content.role == Role::Function
        && !content.parts.is_empty()
        && content.parts.iter().all(|p| matches!(p, Part::FunctionResponse { .. }))
}

fn model_turn_has_no_parts(content: &Content) -> bool {
    content.role == Role::Model && content.parts.is_empty()
}

/// Apply the three deterministic pre-rules. `None` means no pre-rule fired
/// and a model self-classification request is needed.
fn pre_rule(comprehensive_history: &[Content], curated_history: &[Content]) -> Option<NextSpeaker> {
    let last_comprehensive = comprehensive_history.last()?;
    if is_function_response_turn(last_comprehensive) {
        return Some(NextSpeaker::Model);
    }
    if model_turn_has_no_parts(last_comprehensive) {
        return Some(NextSpeaker::Model);
    }
    let last_curated = curated_history.last()?;
    if last_curated.role != Role::Model {
        return Some(NextSpeaker::User);
    }
    None
}

/// Determine who should speak next. `None` inputs (empty history) or a
/// model self-classification failure both resolve to `User` (end the turn).
pub async fn check_next_speaker(
    comprehensive_history: &[Content],
    curated_history: &[Content],
    model: &dyn ModelProvider,
) -> NextSpeaker {
    if comprehensive_history.is_empty() || curated_history.is_empty() {
        return NextSpeaker::User;
    }
    if let Some(speaker) = pre_rule(comprehensive_history, curated_history) {
        return speaker;
    }

    let mut contents = curated_history.to_vec();
    contents.push(Content::user(CHECK_PROMPT));
    let req = CompletionRequest { system_instruction: None, history: contents, tools: Vec::new() };

    match classify(model, req).await {
        Some(speaker) => speaker,
        None => {
            warn!("next-speaker self-classification failed; ending turn");
            NextSpeaker::User
        }
    }
}

async fn classify(model: &dyn ModelProvider, req: CompletionRequest) -> Option<NextSpeaker> {
    let mut stream = model.generate_content_stream(req).await.ok()?;
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        match event.ok()? {
            ResponseEvent::TextDelta(delta) => text.push_str(&delta),
            ResponseEvent::Done => break,
            _ => {}
        }
    }
    let parsed: serde_json::Value = serde_json::from_str(text.trim()).ok()?;
    match parsed.get("next_speaker").and_then(|v| v.as_str())? {
        "user" => Some(NextSpeaker::User),
        "model" => Some(NextSpeaker::Model),
        _ => None,
    }
}
