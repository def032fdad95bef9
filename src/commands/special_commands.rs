//! Special commands parser for interactive chat mode
//!
//! Lines starting with `/` control the session instead of being sent to
//! the assistant. Command names are case-insensitive; arguments (session
//! ids, names, paths) are kept as typed.

use std::path::PathBuf;

use thiserror::Error;

use crate::controller::{UserCommand, DEFAULT_SESSION_NAME};

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Re-fetch and show the session list
    ListSessions,

    /// Create a session and switch to it
    NewSession(String),

    /// Switch to a session by id or `#n` position in the last listing
    SwitchSession(String),

    /// Clear the transcript locally
    Clear,

    /// Export the transcript, optionally into a directory
    Export(Option<PathBuf>),

    /// Show connection and session status
    ShowStatus,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command
    ///
    /// The input is sent to the assistant as a chat message.
    None,
}

impl SpecialCommand {
    /// Controller command for this special command, if it needs one
    ///
    /// `Help`, `Exit`, and `None` are handled by the input loop itself.
    pub fn into_user_command(self) -> Option<UserCommand> {
        match self {
            Self::ListSessions => Some(UserCommand::RefreshSessions),
            Self::NewSession(name) => Some(UserCommand::CreateSession(name)),
            Self::SwitchSession(target) => Some(UserCommand::SelectSession(target)),
            Self::Clear => Some(UserCommand::ClearHistory),
            Self::Export(dir) => Some(UserCommand::Export(dir)),
            Self::ShowStatus => Some(UserCommand::Status),
            Self::Help | Self::Exit | Self::None => None,
        }
    }
}

/// Parse a user input string into a special command
///
/// # Errors
///
/// Returns CommandError::UnknownCommand if input starts with "/" but is not a valid command.
/// Returns CommandError::UnsupportedArgument if a command receives an invalid argument.
/// Returns CommandError::MissingArgument if a command requires an argument but none was provided.
///
/// # Examples
///
/// ```
/// use fgo_chat::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// let cmd = parse_special_command("/switch #2").unwrap();
/// assert_eq!(cmd, SpecialCommand::SwitchSession("#2".to_string()));
///
/// let cmd = parse_special_command("阿尔托莉雅的宝具是什么？").unwrap();
/// assert_eq!(cmd, SpecialCommand::None);
///
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    let (name, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name.to_lowercase(), rest.trim()),
        None => (lower.clone(), ""),
    };

    match name.as_str() {
        "/sessions" | "/refresh" => no_argument(&name, rest, SpecialCommand::ListSessions),

        "/new" => {
            let session_name = if rest.is_empty() {
                DEFAULT_SESSION_NAME
            } else {
                rest
            };
            Ok(SpecialCommand::NewSession(session_name.to_string()))
        }

        "/switch" => {
            if rest.is_empty() {
                Err(CommandError::MissingArgument {
                    command: "/switch".to_string(),
                    usage: "/switch <#n|session_id>".to_string(),
                })
            } else if rest.contains(char::is_whitespace) {
                Err(CommandError::UnsupportedArgument {
                    command: "/switch".to_string(),
                    arg: rest.to_string(),
                })
            } else {
                Ok(SpecialCommand::SwitchSession(rest.to_string()))
            }
        }

        "/clear" => no_argument(&name, rest, SpecialCommand::Clear),

        "/export" => {
            let dir = (!rest.is_empty()).then(|| PathBuf::from(rest));
            Ok(SpecialCommand::Export(dir))
        }

        "/status" => no_argument(&name, rest, SpecialCommand::ShowStatus),
        "/help" | "/?" => Ok(SpecialCommand::Help),

        "exit" | "quit" | "/exit" | "/quit" => Ok(SpecialCommand::Exit),

        _ => Err(CommandError::UnknownCommand(name)),
    }
}

fn no_argument(
    command: &str,
    rest: &str,
    parsed: SpecialCommand,
) -> Result<SpecialCommand, CommandError> {
    if rest.is_empty() {
        Ok(parsed)
    } else {
        Err(CommandError::UnsupportedArgument {
            command: command.to_string(),
            arg: rest.to_string(),
        })
    }
}

/// Display help text for special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat Mode
===========================================

SESSIONS:
  /sessions            - Refresh and list your active sessions
  /refresh             - Same as /sessions
  /new [name]          - Create a session and switch to it (default name: 新对话)
  /switch <#n|id>      - Switch to a session by list position or id

TRANSCRIPT:
  /clear               - Clear the transcript on screen (server history is kept)
  /export [dir]        - Export the transcript to a text file

SESSION INFORMATION:
  /status              - Show connection, session, and response status
  /help                - Show this help message
  /?                   - Same as /help

SESSION CONTROL:
  /exit, exit          - Exit interactive mode
  /quit, quit          - Same as exit

NOTES:
  - Commands are case-insensitive
  - Regular text (not starting with /) is sent to the assistant
  - Messages cannot be sent while disconnected or while a response is streaming
  - The connection is retried automatically after a disconnect
"#
    );
}
