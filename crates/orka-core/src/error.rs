// SPDX-License-Identifier: Apache-2.0
//! Typed errors at the orchestrator/scheduler boundary. Application call
//! sites (the session manager, the CLI binary) still work in
//! `anyhow::Result`, same as sven's `agent.rs`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("model call failed: {0}")]
    Model(#[from] anyhow::Error),
    #[error("model call timed out after {0}s")]
    ModelTimeout(u64),
    #[error("event bus closed: session has ended")]
    BusClosed(#[from] orka_events::BusClosed),
    #[error("turn cancelled by user")]
    Cancelled,
    #[error("max_turns ({0}) reached without a final response")]
    MaxTurnsReached(u32),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid parameters for {tool}: {reason}")]
    InvalidParams { tool: String, reason: String },
    #[error("tool call timed out after {0}s")]
    Timeout(u64),
    #[error("tool call cancelled")]
    Cancelled,
}
