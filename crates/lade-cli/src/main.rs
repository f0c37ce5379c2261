//! lade - command-line client for the Lade platform.
//!
//! Runs one-off processes with the local terminal attached, streams app and
//! addon logs, and deploys the working directory. The credential handling and
//! streaming live in `lade-core`; this crate is the command surface.

mod commands;
mod output;
mod prompt;

use std::io;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use lade_core::{ApiError, AuthError, StreamError};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::logs::{parse_since, LogsArgs};
use commands::run::RunArgs;
use commands::Context;

#[derive(Parser)]
#[command(name = "lade")]
#[command(about = "Lade command-line client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in to Lade
    Login,

    /// Log out of Lade
    Logout,

    /// Run command on app
    Run {
        /// Command to run
        command: Option<String>,

        /// App Name
        #[arg(short, long)]
        app: Option<String>,

        /// Plan
        #[arg(short, long)]
        plan: Option<String>,
    },

    /// Show logs from an app
    Logs {
        /// App Name
        #[arg(short, long)]
        app: Option<String>,

        #[command(flatten)]
        log: LogFlags,
    },

    /// Manage addons
    Addons {
        #[command(subcommand)]
        command: AddonsCommand,
    },

    /// Deploy an app
    Deploy {
        /// App Name
        #[arg(short, long)]
        app: Option<String>,
    },
}

#[derive(Subcommand)]
enum AddonsCommand {
    /// Show logs from an addon
    Logs {
        /// Addon Name
        name: Option<String>,

        #[command(flatten)]
        log: LogFlags,
    },
}

#[derive(Args)]
struct LogFlags {
    /// Follow Log
    #[arg(short, long)]
    follow: bool,

    /// Show Logs Since (e.g. 30m, 1h30m)
    #[arg(short, long, value_parser = parse_since)]
    since: Option<Duration>,

    /// Number of Lines
    #[arg(short, long)]
    tail: Option<u32>,
}

impl LogFlags {
    fn into_args(self, app: Option<String>) -> LogsArgs {
        LogsArgs {
            app,
            follow: self.follow,
            since: self.since,
            tail: self.tail,
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
    // Logs go to stderr so they never mix with streamed output.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = Context::load()?;
    match cli.command {
        Command::Login => commands::login::execute(&ctx).await,
        Command::Logout => commands::logout::execute(&ctx).await,
        Command::Run { command, app, plan } => {
            commands::run::execute(&ctx, RunArgs { command, app, plan }).await
        }
        Command::Logs { app, log } => commands::logs::execute(&ctx, log.into_args(app)).await,
        Command::Addons {
            command: AddonsCommand::Logs { name, log },
        } => commands::addons::logs(&ctx, name, log.into_args(None)).await,
        Command::Deploy { app } => commands::deploy::execute(&ctx, app).await,
    }
}

/// Whether the user abandoned a prompt somewhere under `err`
fn is_interrupted(err: &anyhow::Error) -> bool {
    fn auth(err: &AuthError) -> bool {
        matches!(err, AuthError::Interrupted)
    }
    fn api(err: &ApiError) -> bool {
        matches!(err, ApiError::Auth(inner) if auth(inner))
    }

    err.chain().any(|cause| {
        if let Some(err) = cause.downcast_ref::<AuthError>() {
            return auth(err);
        }
        if let Some(err) = cause.downcast_ref::<ApiError>() {
            return api(err);
        }
        if let Some(err) = cause.downcast_ref::<StreamError>() {
            return matches!(err, StreamError::Api(inner) if api(inner));
        }
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|e| e.kind() == io::ErrorKind::Interrupted)
    })
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(err) if is_interrupted(&err) => {
            debug!("Interrupted");
            1
        }
        Err(err) => {
            eprintln!("Error: {:#}", err);
            1
        }
    };

    // Exit here rather than return: a pending stdin read would otherwise
    // keep the runtime from shutting down.
    std::process::exit(code);
}
