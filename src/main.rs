// SPDX-License-Identifier: Apache-2.0
mod cli;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use orka_config::AgentConfig;
use orka_core::{environment_preamble_turns, system_prompt, AgentRuntimeContext, PromptContext};
use orka_model::MockProvider;
use orka_session::{ClientMessage, SessionManager};
use orka_tools::ToolRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(cmd) = &cli.command {
        match cmd {
            Commands::Completions { shell } => {
                cli::print_completions(*shell);
                return Ok(());
            }
            Commands::ShowConfig => {
                let config = orka_config::load(cli.config.as_deref())?;
                println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
                return Ok(());
            }
        }
    }

    let config = orka_config::load(cli.config.as_deref())?;
    let mut agent_config: AgentConfig = config.agent.clone();
    if let Some(mode) = cli.approval_mode {
        agent_config.approval_mode = mode;
    }

    let runtime_ctx = build_runtime_context(&cli)?;
    agent_config.system_prompt = Some(system_prompt(
        runtime_ctx.system_prompt_override.as_deref(),
        &PromptContext {
            project_root: runtime_ctx.project_root.as_deref(),
            git_context: runtime_ctx.git_context_note.as_deref(),
            ci_context: runtime_ctx.ci_context_note.as_deref(),
            project_context_file: runtime_ctx.project_context_file.as_deref(),
            append: runtime_ctx.append_system_prompt.as_deref(),
        },
    ));

    // No concrete `ModelProvider` wire format is in scope here (see
    // DESIGN.md) — the mock provider is the only implementation in this
    // tree and stands in for whatever network client a deployment wires up.
    let model = Arc::new(MockProvider);
    let registry = Arc::new(ToolRegistry::new());
    let manager = SessionManager::new(model, registry, Arc::new(agent_config));

    let (session_id, mut events) = manager.create_session().await;
    if let Some(root) = &runtime_ctx.project_root {
        let preamble = environment_preamble_turns(root);
        manager.seed_history(&session_id, preamble.to_vec()).await;
    }

    tracing::info!(session_id = %session_id, "session started");

    let stdout_task = tokio::spawn(async move {
        let mut out = std::io::stdout();
        while let Some(event) = events.recv().await {
            if let Ok(line) = serde_json::to_string(&event) {
                let _ = writeln!(out, "{line}");
                let _ = out.flush();
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        match ClientMessage::from_line(&line) {
            Ok(message) => manager.handle_message(&session_id, message).await,
            Err(e) => {
                tracing::warn!(error = %e, line, "dropping unparsable client message");
            }
        }
    }

    manager.end_session(&session_id).await;
    drop(manager);
    let _ = stdout_task.await;
    Ok(())
}

fn build_runtime_context(cli: &Cli) -> anyhow::Result<AgentRuntimeContext> {
    let project_root = match &cli.project_root {
        Some(p) => Some(p.clone()),
        None => {
            let cwd = std::env::current_dir().context("reading current directory")?;
            AgentRuntimeContext::detect_project_root(&cwd)
        }
    };

    let system_prompt_override = cli
        .system_prompt_file
        .as_ref()
        .map(read_text_file)
        .transpose()?;

    Ok(AgentRuntimeContext {
        project_root,
        git_context_note: None,
        ci_context_note: None,
        project_context_file: None,
        append_system_prompt: cli.append_system_prompt.clone(),
        system_prompt_override,
    })
}

fn read_text_file(path: &PathBuf) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Tracing goes to stderr only, and only when `--verbose` is passed — stdout
/// is reserved for the line-delimited event envelope.
fn init_logging(verbose: bool) {
    if !verbose {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
