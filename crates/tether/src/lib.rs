//! Tether CLI - Command-line interface for cluster registrations
//!
//! This CLI gives operators a terminal interface to:
//! - Register external clusters and obtain their connector activation
//! - Refresh, list and import tracked registrations
//! - Deregister clusters
//!
//! Registrations are driven against a simulated control-plane backend whose
//! state is kept in the state directory next to the tracked registrations.

use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod error;
mod output;
mod session;

use commands::registration;
use config::CliConfig;
pub use error::{CliError, CliResult};
use output::{print_field, OutputFormat};
use session::Session;

/// Tether CLI application
#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Tether - External cluster registration CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "TETHER_CONFIG")]
    config: Option<String>,

    /// Directory for tracked state and the simulated backend
    #[arg(short, long, env = "TETHER_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table")]
    output: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Registration(registration::RegistrationCommands),

    /// Show configuration
    Config,
}

/// Run using the current process arguments.
pub async fn run() -> CliResult<()> {
    run_with_args(std::env::args_os()).await
}

/// Run using the provided argument iterator.
pub async fn run_with_args<I, T>(args: I) -> CliResult<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    // Initialize tracing; a subscriber may already be installed when embedded
    let filter = if cli.verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .try_init();

    // Load config
    let config = CliConfig::load(cli.config.as_deref())?;
    let state_dir = match cli.state_dir {
        Some(dir) => dir,
        None => config.state_dir()?,
    };

    match cli.command {
        Commands::Registration(command) => {
            let default_provider = config.default_provider()?;
            let session = Session::open(&state_dir, &config).await?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling");
                    on_interrupt.cancel();
                }
            });

            let result =
                registration::execute(command, &session, default_provider, cli.output, &cancel)
                    .await;
            interrupt.abort();

            // The backend may have changed even when the command failed
            session.persist().await?;
            result
        }
        Commands::Config => {
            let lifecycle = config.lifecycle_config();
            if cli.output == OutputFormat::Json {
                return output::print_json(&serde_json::json!({
                    "state_dir": state_dir,
                    "cli": config,
                    "lifecycle": lifecycle,
                }));
            }

            let config_path = match cli.config.as_deref() {
                Some(path) => PathBuf::from(path),
                None => CliConfig::default_config_path()?,
            };
            print_field("Config file", config_path.display());
            print_field("State dir", state_dir.display());
            print_field(
                "Default provider",
                config.default_provider.as_deref().unwrap_or("-"),
            );
            print_field("Create timeout", format!("{}s", lifecycle.create_timeout.as_secs()));
            print_field(
                "Poll interval",
                format!(
                    "{}s..{}s",
                    lifecycle.poll.min_interval.as_secs(),
                    lifecycle.poll.max_interval.as_secs()
                ),
            );
            print_field("Wait target", &lifecycle.wait_target);
            Ok(())
        }
    }
}
