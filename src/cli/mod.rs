//! Command-line interface.

pub mod commands;
pub mod context;
pub mod output;
pub mod report;
pub mod table;
pub mod types;

pub use types::{Cli, Commands};

use console::style;
use std::process::ExitCode;

/// Exit code for a command that completed with an unsuccessful outcome,
/// such as a run that ended `failed`.
pub const EXIT_UNSUCCESSFUL: u8 = 1;

/// Exit code for a command that could not complete.
pub const EXIT_ERROR: u8 = 2;

/// A command finished and reported its result, but the result is a failure.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct UnsuccessfulOutcome(pub String);

/// Report `err` and map it to the process exit code.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ExitCode {
    // the command already printed its report
    if err.downcast_ref::<UnsuccessfulOutcome>().is_some() {
        return ExitCode::from(EXIT_UNSUCCESSFUL);
    }

    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err:#}", style("Error:").red().bold());
    }
    ExitCode::from(EXIT_ERROR)
}
