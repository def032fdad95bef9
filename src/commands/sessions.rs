use colored::Colorize;

use super::{load_identity, session_directory};
use crate::cli::SessionCommand;
use crate::config::Config;
use crate::directory::Session;
use crate::error::Result;
use crate::render::session_table;

/// Handle session commands
pub async fn handle_sessions(config: Config, command: SessionCommand) -> Result<()> {
    let identity = load_identity(&config)?;
    let directory = session_directory(&config)?;

    match command {
        SessionCommand::List { json } => {
            let sessions = directory.list_active(&identity.user_id).await?;
            tracing::debug!(count = sessions.len(), "Listed sessions");

            if json {
                println!("{}", sessions_json(&sessions)?);
                return Ok(());
            }

            if sessions.is_empty() {
                println!("{}", "No active sessions found.".yellow());
                return Ok(());
            }

            println!("\nActive Sessions:");
            session_table(&sessions, None).printstd();
            println!();
            println!(
                "Use {} to open a session.",
                "fgo-chat chat --session <ID>".cyan()
            );
            println!();
        }
        SessionCommand::Create { name } => {
            let session = directory
                .create(&identity.user_id, &identity.username, &name)
                .await?;
            println!(
                "{}",
                format!("Created session {} ({})", session.display_name, session.id).green()
            );
        }
    }

    Ok(())
}

/// Pretty-printed JSON for `sessions list --json`
pub fn sessions_json(sessions: &[Session]) -> Result<String> {
    Ok(serde_json::to_string_pretty(sessions)?)
}
