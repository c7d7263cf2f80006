// SPDX-License-Identifier: Apache-2.0
//! The conversation turn data model: wire-format-neutral `Content` entries
//! built from tagged `Part` variants, plus the request/response shapes
//! exchanged with a `ModelProvider`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
    Function,
}

/// A single tagged part of a `Content` turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    /// Model-internal reasoning summary. Never counts toward turn validity
    /// on its own — see [`Content::is_valid_model_turn`].
    Thought { subject: String, description: String },
    FunctionCall { id: String, name: String, args: Value },
    FunctionResponse { id: String, name: String, response: Value },
    InlineData { mime_type: String, bytes: String },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn is_thought(&self) -> bool {
        matches!(self, Part::Thought { .. })
    }

    /// A text part counts only if its string is non-empty; every other
    /// non-thought variant always counts.
    fn counts_toward_validity(&self) -> bool {
        match self {
            Part::Text { text } => !text.is_empty(),
            Part::Thought { .. } => false,
            Part::FunctionCall { .. } | Part::FunctionResponse { .. } | Part::InlineData { .. } => {
                true
            }
        }
    }

    /// Rough token estimate: 4 characters per token, minimum 1.
    pub fn approx_tokens(&self) -> usize {
        let chars = match self {
            Part::Text { text } => text.len(),
            Part::Thought { subject, description } => subject.len() + description.len(),
            Part::FunctionCall { name, args, .. } => name.len() + args.to_string().len(),
            Part::FunctionResponse { name, response, .. } => {
                name.len() + response.to_string().len()
            }
            Part::InlineData { bytes, .. } => bytes.len(),
        };
        (chars / 4).max(1)
    }
}

/// One turn in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, parts: vec![Part::text(text)] }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self { role: Role::Model, parts: vec![Part::text(text)] }
    }

    pub fn function_response(
        id: impl Into<String>,
        name: impl Into<String>,
        response: Value,
    ) -> Self {
        Self {
            role: Role::Function,
            parts: vec![Part::FunctionResponse { id: id.into(), name: name.into(), response }],
        }
    }

    /// At least one part with non-empty `text`, a `functionCall`, or
    /// `inlineData`. A turn made only of `thought` parts (or with zero
    /// parts) is invalid.
    pub fn is_valid_model_turn(&self) -> bool {
        self.parts.iter().any(Part::counts_toward_validity)
    }

    /// A `function`-role turn's parts must all be `functionResponse`.
    pub fn is_valid_function_turn(&self) -> bool {
        self.role == Role::Function
            && !self.parts.is_empty()
            && self.parts.iter().all(|p| matches!(p, Part::FunctionResponse { .. }))
    }

    pub fn function_calls(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.parts.iter().filter_map(|p| match p {
            Part::FunctionCall { id, name, args } => Some((id.as_str(), name.as_str(), args)),
            _ => None,
        })
    }

    pub fn approx_tokens(&self) -> usize {
        self.parts.iter().map(Part::approx_tokens).sum::<usize>().max(1)
    }

    /// Concatenation of all `text` parts, or `None` if there are none.
    pub fn as_text(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.join(""))
        }
    }
}

/// Schema of a tool offered to the model for a single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A request to a [`crate::ModelProvider`].
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system_instruction: Option<String>,
    pub history: Vec<Content>,
    pub tools: Vec<ToolSchema>,
}

/// One streamed chunk from `generateContentStream`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    TextDelta(String),
    ThoughtDelta { subject: String, description: String },
    FunctionCall { id: String, name: String, args: Value },
    Usage(orka_events::UsageMetadata),
    Done,
}
