//! FGO Chat - terminal client for the FGO game assistant
//!
#![doc = "FGO Chat - terminal client for the FGO game assistant"]
#![doc = "Main entry point for the fgo-chat application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fgo_chat::cli::{Cli, Commands};
use fgo_chat::commands;
use fgo_chat::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat { session, new } => {
            tracing::info!("Starting interactive chat mode");
            if let Some(s) = &session {
                tracing::debug!("Opening session: {}", s);
            }
            if let Some(n) = &new {
                tracing::debug!("Creating session: {}", n);
            }

            commands::chat::run_chat(config, session, new).await?;
            Ok(())
        }
        Commands::Sessions { command } => {
            tracing::info!("Starting session command");
            commands::sessions::handle_sessions(config, command).await?;
            Ok(())
        }
        Commands::History { session_id, limit } => {
            tracing::info!("Starting history command for session {}", session_id);
            commands::history::show_history(config, session_id, limit).await?;
            Ok(())
        }
        Commands::Export { session_id, output } => {
            tracing::info!("Starting export command for session {}", session_id);
            if let Some(dir) = &output {
                tracing::debug!("Exporting into: {}", dir.display());
            }
            commands::history::export_history(config, session_id, output).await?;
            Ok(())
        }
        Commands::Health => {
            tracing::info!("Checking service health");
            commands::info::check_health(config).await?;
            Ok(())
        }
        Commands::Whoami => {
            commands::info::whoami(config)?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so they do not interleave with the chat transcript.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "fgo_chat=debug"
    } else {
        "fgo_chat=warn"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
