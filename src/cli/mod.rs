//! Command-line surface.
//!
//! butler start [SERVICE] [--foreground]  - Start all services, or one
//! butler stop [SERVICE]                  - Stop all services, or one
//! butler restart [SERVICE]               - Restart all services, or one
//! butler status [SERVICE]                - Show service status
//! butler logs <TARGET>                   - View service/error/system logs
//! butler watch                           - Monitor and auto-restart
//! butler check                           - Environment diagnostics

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::run;

#[derive(Parser, Debug)]
#[command(name = "butler", version, about = "Process supervisor for the CoinButler trading system")]
pub struct Cli {
    /// Directory containing butler.toml (defaults to the current directory)
    #[arg(short, long, env = "BUTLER_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start services (all of them when SERVICE is omitted)
    Start {
        /// Specific service to start (bot, dashboard)
        service: Option<String>,

        /// Run in the foreground instead of detaching (single service only)
        #[arg(long)]
        foreground: bool,
    },

    /// Stop services (all of them when SERVICE is omitted)
    Stop {
        /// Specific service to stop
        service: Option<String>,
    },

    /// Stop and start services
    Restart {
        /// Specific service to restart
        service: Option<String>,
    },

    /// Show service status
    Status {
        /// Specific service (shows all when omitted)
        service: Option<String>,
    },

    /// View logs: a service name, "error", or "system"
    Logs {
        /// Log target (bot, dashboard, error, system)
        target: String,

        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "50")]
        tail: usize,

        /// Follow log output
        #[arg(short, long)]
        follow: bool,
    },

    /// Monitor running services and restart any that die
    Watch,

    /// Diagnose the environment without touching any process
    Check,
}
