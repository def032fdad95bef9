use std::path::PathBuf;

use colored::Colorize;

use super::session_directory;
use crate::config::Config;
use crate::controller::UiEvent;
use crate::error::Result;
use crate::export::write_transcript;
use crate::render::Renderer;

/// Print the stored history of a session
///
/// # Arguments
///
/// * `config` - Global configuration (consumed)
/// * `session_id` - Session to read
/// * `limit` - Maximum messages to fetch; defaults to `history.limit`
pub async fn show_history(config: Config, session_id: String, limit: Option<usize>) -> Result<()> {
    let directory = session_directory(&config)?;
    let limit = limit.unwrap_or(config.history.limit);
    let messages = directory.load_history(&session_id, limit).await?;

    if messages.is_empty() {
        println!("{}", format!("No history for session {}.", session_id).yellow());
        return Ok(());
    }

    let mut renderer = Renderer::stdout();
    renderer.render(&UiEvent::HistoryReplaced(messages))?;
    println!();
    Ok(())
}

/// Export the stored history of a session to a transcript file
///
/// # Arguments
///
/// * `config` - Global configuration (consumed)
/// * `session_id` - Session to export
/// * `output` - Directory to write into; defaults to `export.directory`
pub async fn export_history(
    config: Config,
    session_id: String,
    output: Option<PathBuf>,
) -> Result<()> {
    let directory = session_directory(&config)?;
    let messages = directory
        .load_history(&session_id, config.history.limit)
        .await?;

    let dir = output.unwrap_or_else(|| config.export.output_dir());
    let path = write_transcript(&dir, &session_id, &messages)?;

    println!(
        "{}",
        format!(
            "Exported {} messages to {}",
            messages.len(),
            path.display()
        )
        .green()
    );
    Ok(())
}
