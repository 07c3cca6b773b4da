//! Main entry point for the kvlock command line.

use std::process::ExitCode;

use clap::Parser;
use kvlock_server::{
    command,
    config::{Cli, Configuration},
    startup,
};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let configuration = match Configuration::load(&cli) {
        Ok(configuration) => configuration,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            return ExitCode::from(command::EXIT_ERROR);
        }
    };

    let _logging_guard = match startup::init_logging(&configuration.logging_config()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return ExitCode::from(command::EXIT_ERROR);
        }
    };

    kvlock_core::metrics::describe_metrics();

    match command::execute(cli.command, &configuration).await {
        Ok(code) => code,
        Err(e) => {
            error!("kvlock failed: {:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::from(command::EXIT_ERROR)
        }
    }
}
