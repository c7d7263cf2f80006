// SPDX-License-Identifier: Apache-2.0
//! Wire-neutral event and confirmation types shared by the scheduler, the
//! orchestrator, and the event bus. Kept in this crate (rather than
//! `orka-core`/`orka-tools`) because the bus itself needs to name them
//! without creating a dependency cycle back up to the higher-level crates.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A model "thinking" summary, surfaced separately from regular content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThoughtSummary {
    pub subject: String,
    pub description: String,
}

/// A tool invocation requested by the model within one turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequestInfo {
    /// Unique within the turn that produced it.
    pub call_id: String,
    pub name: String,
    pub args: Value,
    /// True when the request did not originate from the model (e.g. a
    /// client-synthesized retry). Carried through so downstream consumers
    /// can distinguish provenance without inspecting call-site context.
    pub client_initiated: bool,
}

/// What the front-end must show the user before a gated tool call runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfirmationDetails {
    Edit { file_path: String, diff: String },
    Exec { command: String },
    Mcp { server_name: String, tool_name: String },
    Info { prompt: String },
}

/// The three-valued user decision on a suspended tool call.
///
/// `ModifyWithEditor` carries the edited arguments the user produced; the
/// scheduler substitutes them for `ToolCallRequestInfo::args` before the
/// call runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Approve,
    Cancel,
    ModifyWithEditor(Value),
}

/// Terminal report for one tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallResponseInfo {
    pub call_id: String,
    /// The `functionResponse` part(s) to append to history, pre-serialized.
    pub response_parts: Value,
    pub display_result: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageMetadata {
    pub prompt_token_count: u32,
    pub candidates_token_count: u32,
    pub total_token_count: u32,
    pub api_time_ms: Option<u64>,
}

/// Every event kind the core can emit, per the external event envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AgentEvent {
    Content(String),
    Thought(ThoughtSummary),
    ToolCallRequest(ToolCallRequestInfo),
    ToolCallConfirmation {
        request: ToolCallRequestInfo,
        details: ConfirmationDetails,
    },
    ToolCallResponse(ToolCallResponseInfo),
    /// Live output from a still-executing tool call. Order across distinct
    /// calls is not guaranteed.
    ToolLog { call_id: String, chunk: String },
    UserCancelled,
    Error { message: String, status: Option<String> },
    ChatCompressed { original_token_count: u32, new_token_count: u32 },
    UsageMetadata(UsageMetadata),
    TurnComplete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_event_serializes_with_tagged_envelope() {
        let ev = AgentEvent::Content("hello".into());
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"type\":\"content\""));
        assert!(json.contains("\"value\":\"hello\""));
    }

    #[test]
    fn tool_call_confirmation_round_trips() {
        let ev = AgentEvent::ToolCallConfirmation {
            request: ToolCallRequestInfo {
                call_id: "c1".into(),
                name: "list_directory".into(),
                args: serde_json::json!({"path": "/x"}),
                client_initiated: false,
            },
            details: ConfirmationDetails::Exec { command: "ls /x".into() },
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: AgentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(ev, back);
    }

    #[test]
    fn confirmation_outcome_tags_are_snake_case() {
        let json =
            serde_json::to_string(&ConfirmationOutcome::ModifyWithEditor(serde_json::json!({}))).unwrap();
        assert_eq!(json, "{\"modify_with_editor\":{}}");
    }
}
