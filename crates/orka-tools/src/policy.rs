// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;

use regex::Regex;

use orka_config::ToolsConfig;

/// Per-command decision for exec-category tools, driven by config-supplied
/// glob patterns. A tool's `should_confirm` may consult this to decide
/// between auto-running, asking, or refusing outright via `validate_params`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalPolicy {
    /// Always run without asking.
    Auto,
    /// Ask the user before each invocation.
    Ask,
    /// Never run.
    Deny,
}

/// Policy engine that maps a command string to an approval decision.
#[derive(Debug)]
pub struct ToolPolicy {
    auto_patterns: Vec<Regex>,
    deny_patterns: Vec<Regex>,
}

impl ToolPolicy {
    pub fn from_config(cfg: &ToolsConfig) -> Self {
        let compile = |patterns: &[String]| -> Vec<Regex> {
            patterns.iter().filter_map(|p| glob_to_regex(p)).collect()
        };
        Self {
            auto_patterns: compile(&cfg.auto_approve_patterns),
            deny_patterns: compile(&cfg.deny_patterns),
        }
    }

    pub fn decide(&self, command: &str) -> ApprovalPolicy {
        for re in &self.deny_patterns {
            if re.is_match(command) {
                return ApprovalPolicy::Deny;
            }
        }
        for re in &self.auto_patterns {
            if re.is_match(command) {
                return ApprovalPolicy::Auto;
            }
        }
        ApprovalPolicy::Ask
    }
}

/// Convert a simple shell glob pattern to a [`Regex`]. Only `*` (match
/// anything) and `?` (match one char) are supported.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Session-scoped cache of "always approve" decisions, keyed by server name
/// alone or by `(server name, tool name)`. Mutated only by the scheduler's
/// confirmation-resume path; consulted before calling a tool's
/// `should_confirm` so a trusted call short-circuits straight to `scheduled`.
#[derive(Debug, Default)]
pub struct TrustSet {
    servers: HashSet<String>,
    tools: HashSet<(String, String)>,
}

impl TrustSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust every tool on `server_name` for the rest of the session.
    pub fn trust_server(&mut self, server_name: impl Into<String>) {
        self.servers.insert(server_name.into());
    }

    /// Trust exactly `(server_name, tool_name)` for the rest of the session.
    pub fn trust_tool(&mut self, server_name: impl Into<String>, tool_name: impl Into<String>) {
        self.tools.insert((server_name.into(), tool_name.into()));
    }

    /// `true` if either the whole server or this specific tool was trusted.
    pub fn is_trusted(&self, server_name: &str, tool_name: &str) -> bool {
        self.servers.contains(server_name)
            || self.tools.contains(&(server_name.to_string(), tool_name.to_string()))
    }
}
