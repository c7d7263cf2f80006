// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Named provider configurations.
    ///
    /// Define custom endpoints, local models, or additional accounts here and
    /// reference them by name with `--model <key>` or `--model <key>/<model>`.
    ///
    /// ```yaml
    /// providers:
    ///   my_ollama:
    ///     provider: openai
    ///     base_url: http://localhost:11434/v1
    ///     name: llama3.2
    /// ```
    #[serde(default)]
    pub providers: std::collections::HashMap<String, ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier (opaque to this crate — resolved by whatever
    /// concrete `ModelProvider` the caller wires up).
    pub provider: String,
    /// Model name forwarded to the provider.
    pub name: String,
    /// Environment variable that holds the API key (read at runtime).
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer `api_key_env` in config files to avoid
    /// secrets in version-controlled files.
    pub api_key: Option<String>,
    /// Base URL override, for local proxies or self-hosted endpoints.
    pub base_url: Option<String>,
    /// Maximum tokens to request in a single completion.
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0-2.0).
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "gpt-4o".into(),
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_tokens: Some(4096),
            temperature: Some(0.2),
        }
    }
}

/// Session-wide approval gate for tool calls (§4.F Gate phase).
///
/// `yolo` skips all confirmations; `auto_edit` skips only for
/// edit-category tools; `default` confirms everything confirmable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    #[default]
    Default,
    AutoEdit,
    Yolo,
}

impl std::fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalMode::Default => write!(f, "default"),
            ApprovalMode::AutoEdit => write!(f, "auto_edit"),
            ApprovalMode::Yolo => write!(f, "yolo"),
        }
    }
}

fn default_max_turns() -> u32 {
    100
}
fn default_compaction_threshold() -> f32 {
    0.85
}
fn default_compaction_keep_recent() -> usize {
    6
}
fn default_tool_result_token_cap() -> usize {
    4000
}
fn default_compaction_overhead_reserve() -> f32 {
    0.10
}

/// Strategy used when compacting the session context.
///
/// `Structured` (default) instructs the model to produce a typed Markdown
/// checkpoint with fixed sections. `Narrative` uses a free-form
/// summarization prompt instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompactionStrategy {
    #[default]
    Structured,
    Narrative,
}

impl std::fmt::Display for CompactionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompactionStrategy::Structured => write!(f, "structured"),
            CompactionStrategy::Narrative => write!(f, "narrative"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Session-wide tool approval gate.
    #[serde(default)]
    pub approval_mode: ApprovalMode,
    /// Maximum number of turn-loop iterations before the orchestrator stops
    /// unconditionally (§4.I).
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Token fraction at which proactive compaction triggers (0.0-1.0).
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: f32,
    /// Number of recent non-system turns preserved verbatim during
    /// compaction. The remainder is summarized. Set to 0 to summarize the
    /// full history.
    #[serde(default = "default_compaction_keep_recent")]
    pub compaction_keep_recent: usize,
    /// Compaction checkpoint format.
    #[serde(default)]
    pub compaction_strategy: CompactionStrategy,
    /// Maximum tokens allowed for a single tool result before it is
    /// deterministically truncated. 0 disables per-result truncation.
    #[serde(default = "default_tool_result_token_cap")]
    pub tool_result_token_cap: usize,
    /// Fraction of the context window reserved for tool schemas and the
    /// environment preamble, reducing the effective compaction threshold.
    #[serde(default = "default_compaction_overhead_reserve")]
    pub compaction_overhead_reserve: f32,
    /// System prompt override; `None` uses the built-in prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Per-model-call wall-clock deadline in seconds (0 = no limit).
    #[serde(default = "default_model_call_timeout_secs")]
    pub model_call_timeout_secs: u64,
    /// Per-tool-call wall-clock deadline in seconds (0 = no limit).
    #[serde(default = "default_tool_call_timeout_secs")]
    pub tool_call_timeout_secs: u64,
}

fn default_model_call_timeout_secs() -> u64 {
    600
}
fn default_tool_call_timeout_secs() -> u64 {
    300
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            approval_mode: ApprovalMode::default(),
            max_turns: default_max_turns(),
            compaction_threshold: default_compaction_threshold(),
            compaction_keep_recent: default_compaction_keep_recent(),
            compaction_strategy: CompactionStrategy::default(),
            tool_result_token_cap: default_tool_result_token_cap(),
            compaction_overhead_reserve: default_compaction_overhead_reserve(),
            system_prompt: None,
            model_call_timeout_secs: default_model_call_timeout_secs(),
            tool_call_timeout_secs: default_tool_call_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Shell commands matching these glob patterns are pre-approved,
    /// short-circuiting `shouldConfirm`.
    pub auto_approve_patterns: Vec<String>,
    /// Shell commands matching these glob patterns are always denied,
    /// regardless of `approval_mode`.
    pub deny_patterns: Vec<String>,
    /// Default timeout in seconds for a single tool call, when the agent
    /// config's `tool_call_timeout_secs` is not overridden per call.
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            auto_approve_patterns: vec![
                "cat *".into(),
                "ls *".into(),
                "find *".into(),
                "rg *".into(),
                "grep *".into(),
            ],
            deny_patterns: vec!["rm -rf /*".into(), "dd if=*".into()],
            timeout_secs: 30,
        }
    }
}
