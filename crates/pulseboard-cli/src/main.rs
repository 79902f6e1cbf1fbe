//! Pulseboard CLI - sign in to a Pulseboard workspace and talk to its API.
//!
//! The session (credential, identity, workspace) lives in
//! `pulseboard-core`; this binary wires it up and exposes it as commands.

mod app;

use std::io;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use pulseboard_core::Config;

/// Log file name prefix in the cache directory
const LOG_FILE_PREFIX: &str = "pulseboard.log";

#[derive(Parser)]
#[command(name = "pulseboard", version, about = "Pulseboard command-line client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
        /// Read from PULSEBOARD_PASSWORD or prompted when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account and sign in
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign in with an authorization code from an external provider
    Oauth {
        provider: String,
        #[arg(long)]
        code: String,
        #[arg(long)]
        redirect_uri: Option<String>,
    },
    /// Sign out and forget the stored credential
    Logout,
    /// Show who is signed in
    Whoami,
    /// Re-scope the session to another workspace
    SwitchWorkspace { workspace_id: i64 },
    /// GET an API path with the current session
    Get { path: String },
}

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` controls the level (default `warn`). When file logging is
/// enabled the returned guard must stay alive until exit.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.log_to_file.then(|| config.cache_dir()) {
        Some(Ok(dir)) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: failed to load config ({}), using defaults", e);
            Config::default()
        }
    };

    let _log_guard = init_tracing(&config);
    info!("Pulseboard CLI starting");

    let mut app = App::new(config)?;

    match cli.command {
        Command::Login { email, password } => app.login(email, password).await,
        Command::Signup {
            email,
            username,
            name,
            password,
        } => app.signup(email, username, name, password).await,
        Command::Oauth {
            provider,
            code,
            redirect_uri,
        } => app.federated_login(provider, code, redirect_uri).await,
        Command::Logout => {
            app.logout();
            Ok(())
        }
        Command::Whoami => {
            app.whoami();
            Ok(())
        }
        Command::SwitchWorkspace { workspace_id } => app.switch_workspace(workspace_id).await,
        Command::Get { path } => app.get(&path).await,
    }
}
