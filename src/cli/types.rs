//! CLI type definitions
//!
//! Clap structures that define the command-line interface.

use clap::{Parser, Subcommand};

use crate::cli::commands::{
    init::InitArgs, logs::LogsArgs, results::ResultsArgs, resume::ResumeArgs, run::RunArgs,
    sandbox_exec::SandboxExecArgs, status::StatusArgs,
};

/// Command-line interface for phylum.
#[derive(Parser, Debug)]
#[command(name = "phylum")]
#[command(about = "Phylum - evolutionary, test-gated code repair with populations of coding agents", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create .phylum/ with a default config and an empty database
    Init(InitArgs),

    /// Start a run: decompose the plan and evolve agents until the eval passes
    Run(RunArgs),

    /// Continue an interrupted run from its last recorded phase
    Resume(ResumeArgs),

    /// Show a run's steps and generations, or list recent runs
    Status(StatusArgs),

    /// Show per-agent scores and outcomes for a run
    Results(ResultsArgs),

    /// Show an agent's transcript or logs
    Logs(LogsArgs),

    /// Execute one agent task inside a sandbox workspace
    #[command(hide = true)]
    SandboxExec(SandboxExecArgs),
}

impl Commands {
    /// Whether the command runs inside a sandbox rather than a project.
    pub const fn is_sandbox(&self) -> bool {
        matches!(self, Self::SandboxExec(_))
    }
}
