use clap::Parser;
use std::process::ExitCode;
use tracing::error;
use warden::cli::{Cli, Commands};

mod main_dispatch;
mod main_runtime;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match main_runtime::load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            main_runtime::init_logging_simple();
            error!("{}", e);
            return main_dispatch::exit_code(&e);
        }
    };

    // Cycles get file logging; read-only commands stay quiet
    let _guard = match cli.command() {
        Commands::Run | Commands::Watch { .. } => main_runtime::init_logging(&config.logging),
        Commands::Check { .. } | Commands::Status | Commands::Validate => {
            main_runtime::init_logging_simple();
            None
        }
    };

    match main_dispatch::run(&cli, &config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            main_dispatch::exit_code(&e)
        }
    }
}
