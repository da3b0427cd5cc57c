//! Luna CLI application
//!
//! Runs model evaluation tasks as ephemeral multi-stage pods.
//!
//! # Installation
//!
//! ```bash
//! cargo install --path crates/luna-cli
//! ```
//!
//! # Usage
//!
//! ```bash
//! luna run task.yaml --namespace eval --deadline 2h
//! luna render task.yaml
//! luna config init
//! ```
//!
//! The process exits with the evaluation's result code: `0` when every stage
//! succeeded, the failing stage's exit code otherwise, `1` when the run could
//! not complete.

mod args;
mod commands;
mod console;
mod logging;
mod router;

use std::process::ExitCode;

use clap::Parser;

pub use args::{Cli, Commands, ConfigAction};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match router::route(cli).await {
        Ok(code) => exit_code(code),
        Err(e) => {
            console::CliConsole::new(false).error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

/// Codes outside 0..=255 cannot be passed through and become a plain failure
fn exit_code(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}
