mod cmd;
mod config;
mod error;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::{Cli, Commands};
use error::ServerError;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match dispatch(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "bridge-server failed");
            eprintln!("bridge-server: {e}");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` или `info`; bridge пишет disposition'ы на debug.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_thread_names(true).init();
}

async fn dispatch(cli: Cli) -> Result<(), ServerError> {
    match cli.command {
        Commands::Serve(args) => cmd::serve::run(args).await,
    }
}
