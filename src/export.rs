//! Transcript export
//!
//! Writes a session's messages to a plain text file, one entry per
//! message, entries separated by a blank line:
//!
//! ```text
//! [2024-05-01 18:00:00] User: 阿尔托莉雅的宝具是什么？
//!
//! [2024-05-01 18:00:03] Assistant: 誓约胜利之剑 (Excalibur)。
//! ```

use std::path::{Path, PathBuf};

use chrono::Local;

use crate::conversation::Message;
use crate::error::{FgoChatError, Result};

/// Number of session id characters used in export file names
const SESSION_PREFIX_LEN: usize = 8;

/// Render messages as `[time] Role: content` entries, oldest first
///
/// Times are shown in the local timezone. Streaming messages are rendered
/// with whatever content they have so far.
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            format!(
                "[{}] {}: {}",
                m.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                m.role,
                m.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// File name for a transcript of `session_id` exported now
pub fn transcript_file_name(session_id: &str) -> String {
    let prefix: String = session_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(SESSION_PREFIX_LEN)
        .collect();
    let prefix = if prefix.is_empty() { "session" } else { &prefix };

    format!(
        "fgo-chat-{}-{}.txt",
        prefix,
        Local::now().format("%Y%m%d-%H%M%S")
    )
}

/// Write a transcript file into `dir` and return its path
///
/// # Errors
///
/// Returns [`FgoChatError::Export`] if there is nothing to export or the
/// file cannot be written.
pub fn write_transcript(dir: &Path, session_id: &str, messages: &[Message]) -> Result<PathBuf> {
    if messages.is_empty() {
        return Err(FgoChatError::Export("No messages to export".to_string()).into());
    }

    std::fs::create_dir_all(dir).map_err(|e| {
        FgoChatError::Export(format!("Failed to create {}: {}", dir.display(), e))
    })?;

    let path = dir.join(transcript_file_name(session_id));
    let mut contents = render_transcript(messages);
    contents.push('\n');

    std::fs::write(&path, contents).map_err(|e| {
        FgoChatError::Export(format!("Failed to write {}: {}", path.display(), e))
    })?;

    tracing::info!(path = %path.display(), count = messages.len(), "Exported transcript");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Category, Role};
    use crate::test_utils::temp_dir;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn local(ts: DateTime<Utc>) -> String {
        Local
            .from_utc_datetime(&ts.naive_utc())
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }

    #[test]
    fn test_render_transcript_format() {
        let q = at("2024-05-01T10:00:00Z");
        let a = at("2024-05-01T10:00:03Z");
        let messages = vec![
            Message::restored(Role::User, "宝具是什么？".to_string(), q, None),
            Message::restored(
                Role::Assistant,
                "Excalibur".to_string(),
                a,
                Some(Category::KnowledgeBase),
            ),
        ];

        let expected = format!(
            "[{}] User: 宝具是什么？\n\n[{}] Assistant: Excalibur",
            local(q),
            local(a)
        );
        assert_eq!(render_transcript(&messages), expected);
    }

    #[test]
    fn test_render_empty_transcript() {
        assert_eq!(render_transcript(&[]), "");
    }

    #[test]
    fn test_file_name_uses_session_prefix() {
        let name = transcript_file_name("3f2a9c1e-0000-4000-8000-000000000000");
        assert!(name.starts_with("fgo-chat-3f2a9c1e-"));
        assert!(name.ends_with(".txt"));

        let odd = transcript_file_name("../../");
        assert!(odd.starts_with("fgo-chat-session-"));
    }

    #[test]
    fn test_write_transcript_creates_file() {
        let dir = temp_dir();
        let out = dir.path().join("exports");
        let messages = vec![Message::user("hello")];

        let path = write_transcript(&out, "sess-1", &messages).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("] User: hello"));
        assert!(contents.ends_with('\n'));
        assert_eq!(path.parent().unwrap(), out.as_path());
    }

    #[test]
    fn test_write_empty_transcript_is_error() {
        let dir = temp_dir();
        let err = write_transcript(dir.path(), "sess-1", &[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FgoChatError>(),
            Some(FgoChatError::Export(_))
        ));
    }
}
