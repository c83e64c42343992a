use clap::Parser;
use tracing_subscriber::EnvFilter;

use butler::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    match &cli.command {
        // Read-only commands keep the terminal quiet
        Commands::Status { .. } | Commands::Logs { .. } | Commands::Check => {
            init_logging_simple();
        }
        _ => init_logging(),
    }

    match cli::run(cli).await {
        Ok(code) => std::process::ExitCode::from(code),
        Err(e) => {
            eprintln!("\x1b[31m✗ {e:#}\x1b[0m");
            std::process::ExitCode::from(1)
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,butler=debug,reqwest=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
