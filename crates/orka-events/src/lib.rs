// SPDX-License-Identifier: Apache-2.0
//! Event Bus and Cancellation Signal: the two foundational primitives every
//! other crate in the workspace builds on.

mod bus;
mod cancellation;
mod event;

pub use bus::{BusClosed, EventBus};
pub use cancellation::CancelSignal;
pub use event::{
    AgentEvent, ConfirmationDetails, ConfirmationOutcome, ThoughtSummary, ToolCallRequestInfo,
    ToolCallResponseInfo, UsageMetadata,
};
