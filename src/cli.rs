//! Command-line interface definition for FGO Chat
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat, session management,
//! history inspection, and transcript export.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// FGO Chat - terminal client for the FGO game assistant
///
/// Chat with the assistant over a streaming connection, manage your
/// sessions, and export transcripts.
#[derive(Parser, Debug, Clone)]
#[command(name = "fgo-chat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Override the agent service base URL (e.g. http://localhost:8000)
    #[arg(long, env = "FGO_CHAT_SERVER")]
    pub server: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for FGO Chat
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat
    Chat {
        /// Open this session instead of the most recent one
        #[arg(short, long)]
        session: Option<String>,

        /// Create a new session with this name and open it
        #[arg(short, long, conflicts_with = "session")]
        new: Option<String>,
    },

    /// Manage chat sessions
    Sessions {
        /// Session management subcommand
        #[command(subcommand)]
        command: SessionCommand,
    },

    /// Print the stored history of a session
    History {
        /// Session identifier
        session_id: String,

        /// Maximum number of messages to fetch
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Export a session transcript to a text file
    Export {
        /// Session identifier
        session_id: String,

        /// Directory to write the transcript into
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that the agent service is reachable
    Health,

    /// Show the local identity used for session ownership
    Whoami,
}

/// Session management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    /// List active sessions
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Create a new session
    Create {
        /// Display name for the session
        name: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            server: None,
            verbose: false,
            command: Commands::Chat {
                session: None,
                new: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default() {
        let cli = Cli::default();
        assert_eq!(cli.config, Some("config/config.yaml".to_string()));
        assert!(!cli.verbose);
        assert!(cli.server.is_none());
        assert!(matches!(
            cli.command,
            Commands::Chat {
                session: None,
                new: None
            }
        ));
    }

    #[test]
    fn test_cli_parse_chat_command() {
        let cli = Cli::try_parse_from(["fgo-chat", "chat"]).unwrap();
        assert!(matches!(cli.command, Commands::Chat { .. }));
    }

    #[test]
    fn test_cli_parse_chat_with_session() {
        let cli = Cli::try_parse_from(["fgo-chat", "chat", "--session", "abc123"]).unwrap();
        if let Commands::Chat { session, new } = cli.command {
            assert_eq!(session, Some("abc123".to_string()));
            assert!(new.is_none());
        } else {
            panic!("Expected Chat command");
        }
    }

    #[test]
    fn test_cli_chat_session_and_new_conflict() {
        let cli = Cli::try_parse_from(["fgo-chat", "chat", "--session", "a", "--new", "b"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_cli_parse_sessions_list_json() {
        let cli = Cli::try_parse_from(["fgo-chat", "sessions", "list", "--json"]).unwrap();
        if let Commands::Sessions {
            command: SessionCommand::List { json },
        } = cli.command
        {
            assert!(json);
        } else {
            panic!("Expected Sessions List command");
        }
    }

    #[test]
    fn test_cli_parse_sessions_create() {
        let cli = Cli::try_parse_from(["fgo-chat", "sessions", "create", "Saber builds"]).unwrap();
        if let Commands::Sessions {
            command: SessionCommand::Create { name },
        } = cli.command
        {
            assert_eq!(name, "Saber builds");
        } else {
            panic!("Expected Sessions Create command");
        }
    }

    #[test]
    fn test_cli_parse_history_with_limit() {
        let cli = Cli::try_parse_from(["fgo-chat", "history", "s-1", "--limit", "10"]).unwrap();
        if let Commands::History { session_id, limit } = cli.command {
            assert_eq!(session_id, "s-1");
            assert_eq!(limit, Some(10));
        } else {
            panic!("Expected History command");
        }
    }

    #[test]
    fn test_cli_parse_export_with_output() {
        let cli = Cli::try_parse_from(["fgo-chat", "export", "s-1", "-o", "/tmp/out"]).unwrap();
        if let Commands::Export { session_id, output } = cli.command {
            assert_eq!(session_id, "s-1");
            assert_eq!(output, Some(PathBuf::from("/tmp/out")));
        } else {
            panic!("Expected Export command");
        }
    }

    #[test]
    fn test_cli_parse_server_override() {
        let cli =
            Cli::try_parse_from(["fgo-chat", "--server", "http://10.0.0.2:8000", "health"]).unwrap();
        assert_eq!(cli.server, Some("http://10.0.0.2:8000".to_string()));
        assert!(matches!(cli.command, Commands::Health));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["fgo-chat"]).is_err());
    }
}
