//! `media-relay` command line entry point.

mod args;
mod commands;
mod config;
mod logging;

use std::process::ExitCode;

use clap::Parser;

use crate::args::{Cli, Command};
use crate::logging::{LogHandle, DEFAULT_LOG_LEVEL};

#[tokio::main]
async fn main() -> ExitCode {
    let cli: Cli = Cli::parse();

    let log: LogHandle = match LogHandle::init(cli.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("error: {:#}", e);
            return ExitCode::from(2);
        }
    };

    let result: anyhow::Result<ExitCode> = match cli.command {
        Command::Upload(args) => commands::upload(args, &log, cli.log_level.is_some()).await,
        Command::Journal(command) => commands::journal(command).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
