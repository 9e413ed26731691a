//! Phylum CLI entry point.

use clap::Parser;
use std::process::ExitCode;

use phylum::cli::{Cli, Commands};
use phylum::domain::models::LoggingConfig;
use phylum::infrastructure::{config::ConfigLoader, logging::LoggerImpl};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // sandboxes have no project config; they log to stderr only
    let logging = if cli.command.is_sandbox() {
        LoggingConfig::default()
    } else {
        ConfigLoader::load().map(|c| c.logging).unwrap_or_default()
    };
    let _logger = match LoggerImpl::init(&logging) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("warning: logging disabled: {err:#}");
            None
        }
    };

    let result = match cli.command {
        Commands::Init(args) => phylum::cli::commands::init::execute(args, cli.json).await,
        Commands::Run(args) => phylum::cli::commands::run::execute(args, cli.json).await,
        Commands::Resume(args) => phylum::cli::commands::resume::execute(args, cli.json).await,
        Commands::Status(args) => phylum::cli::commands::status::execute(args, cli.json).await,
        Commands::Results(args) => phylum::cli::commands::results::execute(args, cli.json).await,
        Commands::Logs(args) => phylum::cli::commands::logs::execute(args, cli.json).await,
        Commands::SandboxExec(args) => phylum::cli::commands::sandbox_exec::execute(args, cli.json).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => phylum::cli::handle_error(err, cli.json),
    }
}
