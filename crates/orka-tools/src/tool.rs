// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use orka_events::{CancelSignal, ConfirmationDetails};

/// Callback a tool invokes to stream live output while it runs. Delivered to
/// the front-end as `toolLog` events; order across distinct calls is not
/// guaranteed.
pub type LiveOutputCb = Arc<dyn Fn(String) + Send + Sync>;

/// Describes the shape of a tool's text output for context-aware truncation.
///
/// When a tool result exceeds the configured token cap, the history curator
/// uses this category to pick the right extraction strategy. Each tool
/// declares its own category; nothing upstream hard-codes tool names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputCategory {
    /// Terminal / process output: keep the first 60 + last 40 lines so both
    /// the command preamble and the final result are visible.
    HeadTail,
    /// Ordered match list: keep the leading matches so the model sees the
    /// highest-relevance results first.
    MatchList,
    /// File content: keep a head and tail window with a separator so the
    /// model sees both the top of the file and recent changes.
    FileContent,
    /// Generic text: hard-truncate at the character boundary.
    #[default]
    Generic,
}

/// The outcome of a successful tool execution.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Content fed back to the model as the `functionResponse.response`
    /// payload.
    pub llm_content: Value,
    /// Human-readable rendering for the front-end (e.g. a diff or a
    /// truncated command transcript).
    pub display_result: String,
}

impl ToolResult {
    /// Convenience constructor for tools whose output is a single string.
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self { llm_content: Value::String(text.clone()), display_result: text }
    }
}

/// Trait every local or remotely-discovered tool must implement.
///
/// Mirrors the external Tool capability: `{name, description, schema,
/// validateParams, getDescription, shouldConfirm, execute}`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the tool's parameters.
    fn schema(&self) -> Value;

    /// Cheap, synchronous validation of arguments before anything is
    /// scheduled. Returns an error string on failure, `None` on success.
    fn validate_params(&self, _args: &Value) -> Option<String> {
        None
    }

    /// Human-readable one-line rendering of a specific invocation, used in
    /// confirmation prompts and logs. Default: name plus compact JSON args.
    fn get_description(&self, args: &Value) -> String {
        format!("{}({})", self.name(), args)
    }

    /// Whether this invocation needs user approval before running. `None`
    /// means run without asking.
    fn should_confirm(&self, _args: &Value) -> Option<ConfirmationDetails> {
        None
    }

    /// Describes the shape of this tool's output for context-aware
    /// truncation. Default is [`OutputCategory::Generic`] (hard truncation).
    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }

    /// Execute the tool. `cancel` must be observed at any I/O boundary;
    /// `live_output`, if present, streams incremental output. Returns the
    /// terminal-but-successful result, or an error string that the scheduler
    /// surfaces to the model as `response.error`.
    async fn execute(
        &self,
        args: &Value,
        cancel: CancelSignal,
        live_output: Option<LiveOutputCb>,
    ) -> Result<ToolResult, String>;
}
