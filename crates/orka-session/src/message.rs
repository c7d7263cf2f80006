// SPDX-License-Identifier: Apache-2.0
//! The client → core message envelope: one JSON object per line.
//!
//! Three message kinds only: a user turn, a tool-confirmation answer, or a
//! cancellation. Anything else is a parse error, not a silently-ignored
//! variant.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use orka_events::ConfirmationOutcome;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "user_input")]
    UserInput { value: String },
    #[serde(rename = "tool_confirmation_response")]
    ToolConfirmationResponse {
        #[serde(rename = "callId")]
        call_id: String,
        outcome: ClientOutcome,
        /// Required when `outcome` is `modify_with_editor`; ignored otherwise.
        #[serde(rename = "modifiedArgs", default, skip_serializing_if = "Option::is_none")]
        modified_args: Option<Value>,
    },
    #[serde(rename = "cancel")]
    Cancel,
}

impl ClientMessage {
    /// Parse one line of the envelope. A blank line is not a valid message.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientOutcome {
    Approve,
    Cancel,
    ModifyWithEditor,
}

impl ClientOutcome {
    /// Combine the wire-level outcome tag with the `modifiedArgs` payload
    /// that travels alongside it. Only `modify_with_editor` consumes
    /// `modified_args`; a missing value there falls back to `null`.
    pub fn into_confirmation_outcome(self, modified_args: Option<Value>) -> ConfirmationOutcome {
        match self {
            ClientOutcome::Approve => ConfirmationOutcome::Approve,
            ClientOutcome::Cancel => ConfirmationOutcome::Cancel,
            ClientOutcome::ModifyWithEditor => {
                ConfirmationOutcome::ModifyWithEditor(modified_args.unwrap_or(Value::Null))
            }
        }
    }
}
