// SPDX-License-Identifier: Apache-2.0
//! Token-limit table: the context window size the Compression Engine
//! compares session usage against.
//!
//! Any model id not listed here gets the generous default rather than an
//! error — an unrecognized model should still run, just without a
//! tight compaction trigger.

/// Returned for any model id not present in the table.
pub const DEFAULT_TOKEN_LIMIT: u32 = 1_048_576;

/// Fraction of `token_limit` at which the orchestrator should trigger
/// compaction.
pub const COMPRESSION_TRIGGER_RATIO: f32 = 0.95;

/// Context window, in tokens, for a known model id. Falls back to
/// [`DEFAULT_TOKEN_LIMIT`] for anything unrecognized.
pub fn token_limit(model_id: &str) -> u32 {
    match model_id {
        "gpt-4o" | "gpt-4o-mini" | "gpt-4.1" => 128_000,
        "gpt-4-turbo" => 128_000,
        "o1" | "o1-mini" | "o3" | "o3-mini" => 200_000,
        "claude-opus-4-6" | "claude-sonnet-4-6" | "claude-haiku-4-6" => 200_000,
        "claude-3-5-sonnet" | "claude-3-5-haiku" => 200_000,
        "gemini-1.5-pro" | "gemini-1.5-flash" => 1_048_576,
        "gemini-2.0-flash-exp" => 1_048_576,
        _ => DEFAULT_TOKEN_LIMIT,
    }
}

/// The compaction trigger threshold for `model_id`, in tokens.
pub fn compression_trigger(model_id: &str) -> u32 {
    (token_limit(model_id) as f32 * COMPRESSION_TRIGGER_RATIO) as u32
}
