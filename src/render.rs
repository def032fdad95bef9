//! Terminal rendering of controller output
//!
//! [`Renderer`] turns [`UiEvent`]s into colored terminal output. Tokens
//! of the streaming response are written inline as they arrive, so the
//! answer appears incrementally on a single growing line.

use std::io::{self, Write};

use colored::Colorize;
use prettytable::{format, Table};

use crate::controller::{NoticeLevel, StatusReport, UiEvent};
use crate::conversation::{Message, MessageStatus, Role};
use crate::directory::Session;
use crate::error::Result;
use crate::transport::ConnectionState;

/// Writes UI events to a terminal (or any writer)
#[derive(Debug)]
pub struct Renderer<W: Write> {
    out: W,
    streaming_id: Option<String>,
}

impl Renderer<io::Stdout> {
    /// Renderer writing to standard output
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Renderer<W> {
    /// Create a renderer over `out`
    pub fn new(out: W) -> Self {
        Self {
            out,
            streaming_id: None,
        }
    }

    /// Consume the renderer, returning the writer
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Render one event
    ///
    /// # Errors
    ///
    /// Returns error if writing to the terminal fails
    pub fn render(&mut self, event: &UiEvent) -> Result<()> {
        match event {
            UiEvent::ConnectionChanged(state) => {
                self.end_stream_line()?;
                let line = match state {
                    ConnectionState::Connected => "[connected]".green(),
                    ConnectionState::Connecting => "[connecting...]".yellow(),
                    ConnectionState::Disconnected => "[disconnected]".red(),
                };
                writeln!(self.out, "{}", line)?;
            }
            UiEvent::ComposerEnabled(enabled) => {
                tracing::trace!(enabled, "Composer state");
            }
            UiEvent::SessionsListed { sessions, active } => {
                self.end_stream_line()?;
                self.render_sessions(sessions, active.as_deref())?;
            }
            UiEvent::SessionSelected(session) => {
                self.streaming_id = None;
                writeln!(
                    self.out,
                    "\n{} {} {}",
                    "Session:".bold(),
                    session.display_name.cyan(),
                    format!("({})", session.id).dimmed()
                )?;
            }
            UiEvent::HistoryReplaced(messages) => {
                self.streaming_id = None;
                writeln!(self.out)?;
                for message in messages {
                    self.end_stream_line()?;
                    self.streaming_id = None;
                    match message.status {
                        MessageStatus::Streaming => self.resume_stream(message)?,
                        _ => self.render_message(message)?,
                    }
                }
            }
            UiEvent::MessageAppended(message) => self.on_appended(message)?,
            UiEvent::TokenAppended { message_id, text } => {
                if self.streaming_id.as_deref() == Some(message_id.as_str()) {
                    write!(self.out, "{}", text)?;
                }
            }
            UiEvent::MessageFinished(message) => self.on_finished(message)?,
            UiEvent::Cleared => {
                self.streaming_id = None;
                writeln!(self.out, "{}", "Transcript cleared.".dimmed())?;
            }
            UiEvent::Exported(path) => {
                self.end_stream_line()?;
                writeln!(
                    self.out,
                    "{}",
                    format!("Transcript exported to {}", path.display()).green()
                )?;
            }
            UiEvent::Status(report) => {
                self.end_stream_line()?;
                self.render_status(report)?;
            }
            UiEvent::Notice { level, text } => {
                self.end_stream_line()?;
                match level {
                    NoticeLevel::Info => writeln!(self.out, "{}", text.cyan())?,
                    NoticeLevel::Error => writeln!(self.out, "{} {}", "!".red().bold(), text.red())?,
                }
            }
        }
        self.out.flush()?;
        Ok(())
    }

    fn on_appended(&mut self, message: &Message) -> Result<()> {
        match (message.role, message.status) {
            // The composer already echoed what the user typed.
            (Role::User, _) => {}
            (Role::Assistant, MessageStatus::Streaming) => {
                self.end_stream_line()?;
                write!(self.out, "{} ", "Assistant:".magenta().bold())?;
                self.streaming_id = Some(message.id.clone());
            }
            (Role::Assistant, _) => {
                self.end_stream_line()?;
                self.render_message(message)?;
            }
        }
        Ok(())
    }

    fn on_finished(&mut self, message: &Message) -> Result<()> {
        if self.streaming_id.as_deref() != Some(message.id.as_str()) {
            return self.render_message(message);
        }
        self.streaming_id = None;

        match message.status {
            MessageStatus::Errored => {
                writeln!(self.out)?;
                writeln!(self.out, "{}", message.content.red())?;
            }
            _ => match message.category {
                Some(category) => {
                    writeln!(self.out, " {}", format!("[{}]", category.label()).dimmed())?
                }
                None => writeln!(self.out)?,
            },
        }
        Ok(())
    }

    /// Reprint a partial answer and keep following its tokens
    fn resume_stream(&mut self, message: &Message) -> Result<()> {
        write!(
            self.out,
            "{} {}",
            "Assistant:".magenta().bold(),
            message.content
        )?;
        self.streaming_id = Some(message.id.clone());
        Ok(())
    }

    /// Close the in-progress answer line before printing anything else
    fn end_stream_line(&mut self) -> Result<()> {
        if self.streaming_id.is_some() {
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn render_message(&mut self, message: &Message) -> Result<()> {
        let label = match message.role {
            Role::User => "You:".blue().bold(),
            Role::Assistant => "Assistant:".magenta().bold(),
        };
        let content = match message.status {
            MessageStatus::Errored => message.content.red(),
            _ => message.content.normal(),
        };
        write!(self.out, "{} {}", label, content)?;
        if let Some(category) = message.category {
            write!(self.out, " {}", format!("[{}]", category.label()).dimmed())?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    fn render_sessions(&mut self, sessions: &[Session], active: Option<&str>) -> Result<()> {
        if sessions.is_empty() {
            writeln!(self.out, "{}", "No active sessions.".yellow())?;
            return Ok(());
        }

        let table = session_table(sessions, active);
        writeln!(self.out, "\n{}", "Sessions:".bold())?;
        table.print(&mut self.out)?;
        writeln!(
            self.out,
            "Use {} to switch sessions.",
            "/switch <#n|id>".cyan()
        )?;
        Ok(())
    }

    fn render_status(&mut self, report: &StatusReport) -> Result<()> {
        let session = report
            .session
            .as_ref()
            .map(|s| format!("{} ({})", s.display_name, s.id))
            .unwrap_or_else(|| "none".to_string());
        let connection = match report.connection {
            ConnectionState::Connected => report.connection.to_string().green(),
            ConnectionState::Connecting => report.connection.to_string().yellow(),
            ConnectionState::Disconnected => report.connection.to_string().red(),
        };

        writeln!(self.out, "User:       {}", report.username)?;
        writeln!(self.out, "Session:    {}", session)?;
        write!(self.out, "Connection: {}", connection)?;
        if report.reconnect_pending {
            write!(self.out, " {}", "(reconnect scheduled)".dimmed())?;
        }
        writeln!(self.out)?;
        writeln!(self.out, "Response:   {:?}", report.stream)?;
        writeln!(self.out, "Messages:   {}", report.messages)?;
        Ok(())
    }
}

/// Build the session listing table shared by the REPL and `sessions list`
///
/// The row of the `active` session, if any, is marked with `*`.
pub fn session_table(sessions: &[Session], active: Option<&str>) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.set_titles(prettytable::row!["#", "ID", "Name", "Last Active"]);

    for (i, session) in sessions.iter().enumerate() {
        let last_active = session
            .last_active
            .unwrap_or(session.created_at)
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M")
            .to_string();
        let marker = if active == Some(session.id.as_str()) {
            "*"
        } else {
            ""
        };
        table.add_row(prettytable::row![
            format!("{}#{}", marker, i + 1),
            session.id,
            session.display_name,
            last_active
        ]);
    }
    table
}
