/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `chat`     - Interactive chat mode
- `sessions` - List and create sessions
- `history`  - Print or export a session's stored history
- `info`     - Service health and local identity

The handlers wire the library components together: the session
directory, the WebSocket connector, the chat controller, and the
terminal renderer.
*/

use std::sync::Arc;

use colored::Colorize;

use crate::config::Config;
use crate::directory::{HttpSessionDirectory, SessionDirectory};
use crate::error::Result;
use crate::identity::{Identity, IdentityStore};

// Special commands parser for the interactive loop
pub mod special_commands;

// Session management commands
pub mod sessions;

// Stored history and transcript export commands
pub mod history;

/// Load (or create) the local identity configured in `config`
pub(crate) fn load_identity(config: &Config) -> Result<Identity> {
    IdentityStore::new(&config.identity)?.load_or_create()
}

/// Build the HTTP session directory for `config`
pub(crate) fn session_directory(config: &Config) -> Result<Arc<dyn SessionDirectory>> {
    Ok(Arc::new(HttpSessionDirectory::new(&config.server)?))
}

// Chat command handler
pub mod chat {
    //! Interactive chat mode handler.
    //!
    //! Runs the chat controller on the async runtime, renders its output
    //! on a separate task, and reads user input with rustyline on a
    //! blocking thread. Input lines become controller commands; the loop
    //! ends on `/exit`, Ctrl-C, or Ctrl-D.

    use super::*;
    use crate::commands::special_commands::{parse_special_command, print_help, SpecialCommand};
    use crate::controller::{ChatController, ControllerHandle, Startup, UserCommand};
    use crate::render::Renderer;
    use crate::transport::{Connector, WebSocketConnector};
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use tokio::sync::mpsc;

    const PROMPT: &str = "fgo> ";

    /// Start interactive chat mode
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `session` - Session id to open instead of the most recent one
    /// * `new` - Name of a session to create and open
    ///
    /// # Examples
    ///
    /// ```
    /// use fgo_chat::commands::chat;
    /// use fgo_chat::config::Config;
    ///
    /// // In application code:
    /// // chat::run_chat(Config::default(), None, None).await?;
    /// ```
    pub async fn run_chat(
        config: Config,
        session: Option<String>,
        new: Option<String>,
    ) -> Result<()> {
        tracing::info!("Starting interactive chat mode");

        let identity = load_identity(&config)?;
        let directory = session_directory(&config)?;
        let connector: Arc<dyn Connector> = Arc::new(WebSocketConnector::new(&config)?);

        let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
        let (controller, handle) =
            ChatController::new(&config, identity.clone(), directory, connector, ui_tx);

        print_welcome_banner(&identity, &config);

        let renderer = tokio::spawn(async move {
            let mut renderer = Renderer::stdout();
            while let Some(event) = ui_rx.recv().await {
                if let Err(e) = renderer.render(&event) {
                    tracing::warn!("Failed to render output: {}", e);
                }
            }
        });
        let input = tokio::task::spawn_blocking(move || read_input(handle));

        let result = controller.run(startup(session, new)).await;

        // The controller owned the UI sender, so the renderer drains and stops.
        if let Err(e) = renderer.await {
            tracing::warn!("Renderer task failed: {}", e);
        }
        match input.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("Input loop failed: {}", e),
            Err(e) => tracing::error!("Input task failed: {}", e),
        }

        println!("Goodbye!");
        result
    }

    /// Which session to open first
    pub(crate) fn startup(session: Option<String>, new: Option<String>) -> Startup {
        match (session, new) {
            (Some(id), _) => Startup::Session(id),
            (None, Some(name)) => Startup::New(name),
            (None, None) => Startup::MostRecent,
        }
    }

    /// Read lines until the user exits, forwarding them to the controller
    ///
    /// Always asks the controller to shut down before returning.
    fn read_input(handle: ControllerHandle) -> Result<()> {
        let result = input_loop(&handle);
        let _ = handle.command(UserCommand::Shutdown);
        result
    }

    fn input_loop(handle: &ControllerHandle) -> Result<()> {
        let mut rl = DefaultEditor::new()?;

        loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(trimmed)?;

                    match parse_special_command(trimmed) {
                        Ok(SpecialCommand::Help) => print_help(),
                        Ok(SpecialCommand::Exit) => break,
                        Ok(SpecialCommand::None) => {
                            handle.command(UserCommand::Send(trimmed.to_string()))?
                        }
                        Ok(command) => {
                            if let Some(command) = command.into_user_command() {
                                handle.command(command)?;
                            }
                        }
                        Err(e) => eprintln!("{}\n", e.to_string().red()),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Display welcome banner at the start of interactive chat mode
    fn print_welcome_banner(identity: &Identity, config: &Config) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║              FGO Chat - Fate/Grand Order Assistant           ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!("User:    {}", identity.username.cyan());
        println!("Service: {}\n", config.server.base_url);
        println!("Type '/help' for available commands, 'exit' to quit\n");
    }

}

/// Service and identity information
pub mod info {
    use super::*;
    use crate::error::FgoChatError;

    /// Query the service health endpoint and report the result
    ///
    /// # Errors
    ///
    /// Returns error if the service is unreachable or reports a status
    /// other than `healthy`.
    pub async fn check_health(config: Config) -> Result<()> {
        let directory = session_directory(&config)?;
        let status = directory.health().await?;

        if !status.is_healthy() {
            return Err(FgoChatError::Network(format!(
                "Service at {} reported status '{}'",
                config.server.base_url, status.status
            ))
            .into());
        }

        println!(
            "{} {} is {}",
            "✓".green(),
            config.server.base_url,
            status.status.green()
        );
        if let Some(timestamp) = status.timestamp {
            println!("Server time: {}", timestamp);
        }
        Ok(())
    }

    /// Print the local identity, creating it on first use
    pub fn whoami(config: Config) -> Result<()> {
        let store = IdentityStore::new(&config.identity)?;
        let identity = store.load_or_create()?;

        println!("User ID:  {}", identity.user_id.cyan());
        println!("Username: {}", identity.username);
        println!("Stored:   {}", store.path().display());
        Ok(())
    }

}
