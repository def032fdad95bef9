use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::{Category, Message, Role};

/// A chat session owned by the agent service
///
/// Session records are immutable once created and are only ever removed
/// server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    /// Server-assigned identifier
    pub id: String,
    /// Human-readable name
    pub display_name: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session last saw activity
    pub last_active: Option<DateTime<Utc>>,
}

/// Session record as returned by `/api/sessions`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SessionRecord {
    session_id: String,
    session_name: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    last_active: Option<String>,
}

impl From<SessionRecord> for Session {
    fn from(record: SessionRecord) -> Self {
        let last_active = record.last_active.as_deref().and_then(parse_timestamp);
        let created_at = record
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .or(last_active)
            .unwrap_or_else(Utc::now);

        Self {
            id: record.session_id,
            display_name: record.session_name,
            created_at,
            last_active,
        }
    }
}

/// Body of `POST /api/sessions`
#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateSessionRequest<'a> {
    pub user_id: &'a str,
    pub username: &'a str,
    pub session_name: &'a str,
}

/// One stored message as returned by `/api/history/{session_id}`
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    /// Stored conversation turn this message belongs to
    #[serde(default)]
    pub conversation_id: Option<i64>,
    /// `"user"` or `"assistant"`; anything else is rejected
    pub role: String,
    /// Message text
    pub content: String,
    /// ISO-8601 timestamp, with or without offset
    #[serde(default)]
    pub created_at: Option<String>,
    /// Classification of the turn
    #[serde(default)]
    pub question_type: Option<String>,
}

/// Service health report from `/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `"healthy"` when the service is up
    pub status: String,
    /// Server time of the check
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl HealthStatus {
    /// Whether the service reported itself healthy
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Convert stored history into view messages, oldest first
///
/// Entries with an unknown role are logged and skipped. The category of a
/// turn is attached to its assistant message only.
pub fn history_to_messages(entries: Vec<HistoryEntry>) -> Vec<Message> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let Some(role) = Role::from_wire(&entry.role) else {
                tracing::warn!(
                    role = %entry.role,
                    conversation_id = ?entry.conversation_id,
                    "Protocol error: unknown role in history, skipping entry"
                );
                return None;
            };

            let created_at = entry
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now);
            let category = match role {
                Role::Assistant => entry
                    .question_type
                    .as_deref()
                    .map(Category::from_question_type),
                Role::User => None,
            };

            Some(Message::restored(role, entry.content, created_at, category))
        })
        .collect()
}

/// Parse an ISO-8601 timestamp; values without an offset are taken as UTC
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::MessageStatus;

    fn entry(role: &str, content: &str) -> HistoryEntry {
        HistoryEntry {
            conversation_id: Some(1),
            role: role.to_string(),
            content: content.to_string(),
            created_at: Some("2024-05-01T10:00:00".to_string()),
            question_type: Some("knowledge_base".to_string()),
        }
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let naive = parse_timestamp("2024-05-01T10:00:00.123456").unwrap();
        assert_eq!(naive.to_rfc3339(), "2024-05-01T10:00:00.123456+00:00");

        let offset = parse_timestamp("2024-05-01T18:00:00+08:00").unwrap();
        assert_eq!(offset.to_rfc3339(), "2024-05-01T10:00:00+00:00");

        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_session_record_conversion() {
        let record: SessionRecord = serde_json::from_value(serde_json::json!({
            "session_id": "sess-1",
            "session_name": "宝具查询",
            "created_at": "2024-05-01T10:00:00",
            "last_active": "2024-05-02T10:00:00",
        }))
        .unwrap();

        let session = Session::from(record);
        assert_eq!(session.id, "sess-1");
        assert_eq!(session.display_name, "宝具查询");
        assert_eq!(
            session.created_at,
            parse_timestamp("2024-05-01T10:00:00").unwrap()
        );
        assert!(session.last_active.is_some());
    }

    #[test]
    fn test_session_created_at_falls_back_to_last_active() {
        let record: SessionRecord = serde_json::from_value(serde_json::json!({
            "session_id": "sess-2",
            "session_name": "n",
            "last_active": "2024-05-02T10:00:00",
        }))
        .unwrap();
        let session = Session::from(record);
        assert_eq!(session.created_at, session.last_active.unwrap());
    }

    #[test]
    fn test_history_skips_unknown_role() {
        let messages = history_to_messages(vec![entry("user", "hi"), entry("bot", "x")]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "hi");
    }

    #[test]
    fn test_history_category_only_on_assistant() {
        let messages = history_to_messages(vec![entry("user", "q"), entry("assistant", "a")]);
        assert_eq!(messages[0].category, None);
        assert_eq!(messages[1].category, Some(Category::KnowledgeBase));
        assert!(messages
            .iter()
            .all(|m| m.status == MessageStatus::Complete));
    }

    #[test]
    fn test_history_preserves_order() {
        let messages = history_to_messages(vec![
            entry("user", "1"),
            entry("assistant", "2"),
            entry("user", "3"),
        ]);
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["1", "2", "3"]);
    }
}
