// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

use orka_config::ApprovalMode;

/// Agent orchestration core: reads a line-delimited JSON client message per
/// line on stdin, writes a line-delimited JSON event envelope per line on
/// stdout, one session per process.
#[derive(Parser, Debug)]
#[command(name = "orka", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to a config file layered on top of the discovered search path.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Override the session-wide tool approval gate.
    #[arg(long, global = true)]
    pub approval_mode: Option<ApprovalMode>,

    /// Override the default system prompt entirely.
    #[arg(long, global = true)]
    pub system_prompt_file: Option<PathBuf>,

    /// Text appended after the default system prompt's guidelines section.
    #[arg(long, global = true)]
    pub append_system_prompt: Option<String>,

    /// Project root to seed the environment preamble from. Defaults to a
    /// `.git` walk-up from the current directory.
    #[arg(long, global = true)]
    pub project_root: Option<PathBuf>,

    /// Emit tracing output to stderr. Off by default since stdout/stderr
    /// framing matters for a duplex JSON protocol.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the fully merged configuration and exit.
    ShowConfig,

    /// Print shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}
