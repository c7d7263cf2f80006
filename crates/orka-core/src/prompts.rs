// SPDX-License-Identifier: Apache-2.0
//! Builds the system instruction sent on every turn and the environment
//! preamble that seeds a chat once at session start.
//!
//! The system instruction is split into a stable part (identity, tool
//! guidelines, project instructions) and a volatile part (git/CI status) so
//! a caching-aware provider can keep the stable prefix warm across turns
//! while the volatile tail changes underneath it.

use std::path::{Path, PathBuf};

use chrono::Local;
use regex::Regex;

use orka_model::Content;

const MAX_FOLDER_ENTRIES: usize = 200;
const ALWAYS_SKIPPED: &[&str] = &[".git", "node_modules", "dist"];

/// Everything the system instruction and environment preamble can draw on.
/// `git_context`/`ci_context` are the volatile fields; everything else is
/// stable for the lifetime of a session.
#[derive(Debug, Default)]
pub struct PromptContext<'a> {
    pub project_root: Option<&'a Path>,
    /// Pre-formatted git status block (branch, commit, dirty count).
    pub git_context: Option<&'a str>,
    /// Pre-formatted CI environment block (runner, branch, event).
    pub ci_context: Option<&'a str>,
    /// Contents of a project instructions file (AGENTS.md or similar).
    pub project_context_file: Option<&'a str>,
    /// Text appended verbatim after the guidelines section.
    pub append: Option<&'a str>,
}

impl<'a> PromptContext<'a> {
    /// The stable portion of this context: volatile fields cleared.
    pub fn stable_only(&self) -> Self {
        Self {
            project_root: self.project_root,
            git_context: None,
            ci_context: None,
            project_context_file: self.project_context_file,
            append: self.append,
        }
    }

    /// The volatile fields rendered as a standalone block, for providers
    /// that keep the stable prefix cached and append this separately.
    /// `None` when neither git nor CI context is present.
    pub fn dynamic_block(&self) -> Option<String> {
        let git = self.git_context.filter(|s| !s.trim().is_empty());
        let ci = self.ci_context.filter(|s| !s.trim().is_empty());
        match (git, ci) {
            (None, None) => None,
            (Some(g), None) => Some(g.to_string()),
            (None, Some(c)) => Some(c.to_string()),
            (Some(g), Some(c)) => Some(format!("{g}\n\n{c}")),
        }
    }
}

fn guidelines() -> &'static str {
    "## Guidelines\n\n\
     - Be concise and precise. Use tools instead of guessing.\n\
     - Discovery workflow: search broadly first, then read specific files with \
       enough surrounding context to act correctly.\n\
     - Batch independent tool calls in parallel within a single turn.\n\
     - Prefer a targeted edit over rewriting a whole file when only part of \
       it needs to change.\n\
     - Do not create new files unless the task requires them.\n\
     - Verify a change (tests, a direct check) before reporting it done.\n\
     - When a tool call fails, read the error and adjust your approach rather \
       than repeating the same call.\n\
     - Never bypass version-control safety checks (hooks, force-push) without \
       the user's explicit go-ahead."
}

/// Build the system instruction. `custom`, if set, overrides the built-in
/// identity and guidelines entirely (still honoring `append`).
pub fn system_prompt(custom: Option<&str>, ctx: &PromptContext<'_>) -> String {
    if let Some(custom) = custom {
        if let Some(extra) = ctx.append {
            return format!("{}\n\n{}", custom.trim_end(), extra);
        }
        return custom.to_string();
    }

    let identity = "You are an autonomous coding agent. You read and modify files, run \
         commands, and call tools to complete the task the user gives you, reporting \
         your progress clearly and stopping only once the task is actually done.";

    let project_section = ctx.project_root.map(|root| {
        format!(
            "\n\n## Project Context\n\
             Project root: `{}`\n\
             - Use this absolute path for file operations.\n\
             - Prefer absolute paths over relative paths in every tool call.",
            root.display()
        )
    });

    let context_file_section = ctx
        .project_context_file
        .map(|content| format!("\n\n## Project Instructions\n\n{content}"));

    let append_section = ctx.append.map(|extra| format!("\n\n{extra}"));

    format!(
        "{identity}{}{}\n\n{}{}",
        project_section.unwrap_or_default(),
        context_file_section.unwrap_or_default(),
        guidelines(),
        append_section.unwrap_or_default(),
    )
}

/// A path is excluded from the folder listing if any component matches an
/// always-skipped name or a user ignore pattern.
fn is_ignored(rel: &Path, patterns: &[Regex]) -> bool {
    if rel
        .components()
        .any(|c| ALWAYS_SKIPPED.contains(&c.as_os_str().to_string_lossy().as_ref()))
    {
        return true;
    }
    let rel_str = rel.to_string_lossy();
    patterns.iter().any(|re| re.is_match(&rel_str))
}

/// Compile `.gitignore`/`.geminiignore`-style lines (blank lines and `#`
/// comments skipped) into simple prefix/substring regexes. Not a full
/// gitignore implementation — good enough to keep common noise directories
/// out of the preamble listing.
fn compile_ignore_patterns(root: &Path) -> Vec<Regex> {
    let mut patterns = Vec::new();
    for file in [".gitignore", ".geminiignore"] {
        let Ok(contents) = std::fs::read_to_string(root.join(file)) else {
            continue;
        };
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let escaped = regex::escape(line.trim_start_matches('/').trim_end_matches('/'));
            let escaped = escaped.replace(r"\*", ".*");
            if let Ok(re) = Regex::new(&format!("^{escaped}(/|$)")) {
                patterns.push(re);
            }
        }
    }
    patterns
}

/// Walk `root` breadth-first-ish (via `walkdir`'s default depth-first order,
/// which is what matters here: stable, deterministic), collecting relative
/// paths up to `MAX_FOLDER_ENTRIES`, skipping ignored paths and their
/// subtrees.
fn build_folder_listing(root: &Path) -> (Vec<PathBuf>, bool) {
    let patterns = compile_ignore_patterns(root);
    let mut entries = Vec::new();
    let mut truncated = false;

    let walker = walkdir::WalkDir::new(root).min_depth(1).into_iter().filter_entry(|entry| {
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        !is_ignored(rel, &[])
    });

    for entry in walker {
        let Ok(entry) = entry else { continue };
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path()).to_path_buf();
        if is_ignored(&rel, &patterns) {
            continue;
        }
        if entries.len() >= MAX_FOLDER_ENTRIES {
            truncated = true;
            break;
        }
        entries.push(rel);
    }
    (entries, truncated)
}

/// Render the once-per-chat environment preamble: date, OS, working
/// directory, and a bounded folder listing.
pub fn environment_preamble(project_root: &Path) -> String {
    let (entries, truncated) = build_folder_listing(project_root);
    let listing = if entries.is_empty() {
        "(empty or unreadable)".to_string()
    } else {
        entries
            .iter()
            .map(|p| format!("  {}", p.display()))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let truncation_note = if truncated {
        format!("\n  ... truncated to {MAX_FOLDER_ENTRIES} entries")
    } else {
        String::new()
    };

    format!(
        "Today's date: {date}\n\
         Operating system: {os}\n\
         Working directory: {cwd}\n\n\
         Folder structure:\n{listing}{truncation_note}",
        date = Local::now().format("%Y-%m-%d"),
        os = std::env::consts::OS,
        cwd = project_root.display(),
    )
}

/// Build the synthetic user/model pair that seeds every chat with the
/// environment preamble, per the orchestrator's once-per-chat contract.
pub fn environment_preamble_turns(project_root: &Path) -> [Content; 2] {
    [
        Content::user(environment_preamble(project_root)),
        Content::model_text("Understood. I have the environment context."),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn empty() -> PromptContext<'static> {
        PromptContext::default()
    }

    #[test]
    fn custom_prompt_is_returned_verbatim() {
        let prompt = system_prompt(Some("Custom instructions here."), &empty());
        assert_eq!(prompt, "Custom instructions here.");
    }

    #[test]
    fn custom_prompt_with_append() {
        let ctx = PromptContext { append: Some("Extra rule."), ..Default::default() };
        let prompt = system_prompt(Some("Base."), &ctx);
        assert!(prompt.contains("Base."));
        assert!(prompt.contains("Extra rule."));
    }

    #[test]
    fn default_prompt_names_the_agent_role() {
        let prompt = system_prompt(None, &empty());
        assert!(prompt.contains("autonomous coding agent"));
        assert!(prompt.contains("## Guidelines"));
    }

    #[test]
    fn project_root_appears_when_set() {
        let root = PathBuf::from("/home/user/project");
        let ctx = PromptContext { project_root: Some(&root), ..Default::default() };
        let prompt = system_prompt(None, &ctx);
        assert!(prompt.contains("/home/user/project"));
        assert!(prompt.contains("Project Context"));
    }

    #[test]
    fn no_project_root_no_section() {
        let prompt = system_prompt(None, &empty());
        assert!(!prompt.contains("Project Context"));
    }

    #[test]
    fn project_context_file_is_injected() {
        let ctx = PromptContext {
            project_context_file: Some("Always write tests."),
            ..Default::default()
        };
        let prompt = system_prompt(None, &ctx);
        assert!(prompt.contains("Project Instructions"));
        assert!(prompt.contains("Always write tests."));
    }

    #[test]
    fn stable_only_clears_volatile_fields() {
        let ctx = PromptContext { git_context: Some("git stuff"), ..Default::default() };
        let stable = ctx.stable_only();
        assert!(stable.git_context.is_none());
    }

    #[test]
    fn dynamic_block_combines_git_and_ci() {
        let ctx = PromptContext {
            git_context: Some("## Git\nbranch: main"),
            ci_context: Some("## CI\nrunner: github"),
            ..Default::default()
        };
        let block = ctx.dynamic_block().unwrap();
        assert!(block.contains("branch: main"));
        assert!(block.contains("runner: github"));
    }

    #[test]
    fn dynamic_block_none_when_both_absent() {
        assert!(empty().dynamic_block().is_none());
    }

    #[test]
    fn environment_preamble_includes_date_os_and_cwd() {
        let dir = tempdir().unwrap();
        let preamble = environment_preamble(dir.path());
        assert!(preamble.contains("Operating system:"));
        assert!(preamble.contains("Working directory:"));
        assert!(preamble.contains(&dir.path().display().to_string()));
    }

    #[test]
    fn folder_listing_excludes_git_directory() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        fs::write(dir.path().join("README.md"), "hello").unwrap();
        let preamble = environment_preamble(dir.path());
        assert!(!preamble.contains(".git"));
        assert!(preamble.contains("README.md"));
    }

    #[test]
    fn folder_listing_honors_gitignore() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "build\n").unwrap();
        fs::create_dir(dir.path().join("build")).unwrap();
        fs::write(dir.path().join("build/output.txt"), "x").unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
        let preamble = environment_preamble(dir.path());
        assert!(!preamble.contains("output.txt"));
        assert!(preamble.contains("main.rs"));
    }

    #[test]
    fn folder_listing_truncates_past_the_cap() {
        let dir = tempdir().unwrap();
        for i in 0..(MAX_FOLDER_ENTRIES + 20) {
            fs::write(dir.path().join(format!("file{i:04}.txt")), "x").unwrap();
        }
        let preamble = environment_preamble(dir.path());
        assert!(preamble.contains("truncated"));
    }

    #[test]
    fn environment_preamble_turns_seed_user_then_model() {
        let dir = tempdir().unwrap();
        let turns = environment_preamble_turns(dir.path());
        assert_eq!(turns[0].role, orka_model::Role::User);
        assert_eq!(turns[1].role, orka_model::Role::Model);
    }
}
