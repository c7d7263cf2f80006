// SPDX-License-Identifier: Apache-2.0
//! Runtime context for a session: values detected or supplied at startup,
//! as distinct from [`orka_config::AgentConfig`], which holds only
//! config-file fields.

use std::path::PathBuf;

/// Environment-detected context injected into a session at construction
/// time.
#[derive(Debug, Default, Clone)]
pub struct AgentRuntimeContext {
    /// Absolute path to the project root (found via a `.git` walk-up).
    pub project_root: Option<PathBuf>,
    /// Pre-formatted git context block (branch, commit, dirty status).
    pub git_context_note: Option<String>,
    /// Pre-formatted CI environment context block.
    pub ci_context_note: Option<String>,
    /// Contents of a project instructions file (e.g. `AGENTS.md`).
    pub project_context_file: Option<String>,
    /// Text appended to the default system prompt.
    pub append_system_prompt: Option<String>,
    /// Full system prompt override; replaces `AgentConfig::system_prompt`
    /// entirely when set.
    pub system_prompt_override: Option<String>,
}

impl AgentRuntimeContext {
    /// Walk up from `start` looking for a `.git` directory, returning the
    /// first ancestor that has one.
    pub fn detect_project_root(start: &std::path::Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            if dir.join(".git").exists() {
                return Some(dir);
            }
            if !dir.pop() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn default_context_has_no_project_root() {
        assert!(AgentRuntimeContext::default().project_root.is_none());
    }

    #[test]
    fn detect_project_root_finds_dot_git_in_ancestor() {
        let root = tempdir().unwrap();
        fs::create_dir(root.path().join(".git")).unwrap();
        let nested = root.path().join("src/inner");
        fs::create_dir_all(&nested).unwrap();

        let found = AgentRuntimeContext::detect_project_root(&nested).unwrap();
        assert_eq!(found, root.path());
    }

    #[test]
    fn detect_project_root_returns_none_when_absent() {
        let dir = tempdir().unwrap();
        assert!(AgentRuntimeContext::detect_project_root(dir.path()).is_none());
    }
}
