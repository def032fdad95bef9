//! Wire protocol for the streaming chat connection
//!
//! Every WebSocket text message is one JSON object tagged by `type`.
//!
//! Inbound (server to client):
//!
//! ```text
//! {"type":"system","content":"..."}
//! {"type":"start","timestamp":"..."}
//! {"type":"token","content":"..."}
//! {"type":"end","question_type":"general","timestamp":"..."}
//! {"type":"error","content":"..."}
//! {"type":"pong","timestamp":"..."}
//! ```
//!
//! Outbound (client to server):
//!
//! ```text
//! {"type":"message","content":"..."}
//! {"type":"ping"}
//! ```

use serde::{Deserialize, Serialize};

use crate::conversation::Category;
use crate::error::{FgoChatError, Result};

/// One decoded inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Informational notice from the server (log-only)
    System { content: String },
    /// A new assistant response begins
    Start,
    /// Incremental chunk of the current response
    Token { content: String },
    /// The current response finished; carries its classification
    End { category: Category },
    /// The current response (or the last request) failed
    Error { content: String },
    /// Heartbeat reply
    Pong,
}

impl Frame {
    /// Short lowercase name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::Start => "start",
            Self::Token { .. } => "token",
            Self::End { .. } => "end",
            Self::Error { .. } => "error",
            Self::Pong => "pong",
        }
    }
}

/// Loosely-typed inbound frame, classified by [`parse_frame`]
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    question_type: Option<String>,
}

/// Decode one inbound text message into a [`Frame`]
///
/// # Errors
///
/// Returns [`FgoChatError::Protocol`] for malformed JSON, an unknown
/// `type`, or a `token` frame without content.
///
/// # Examples
///
/// ```
/// use fgo_chat::protocol::{parse_frame, Frame};
///
/// let frame = parse_frame(r#"{"type":"token","content":"Hi"}"#).unwrap();
/// assert_eq!(frame, Frame::Token { content: "Hi".to_string() });
///
/// assert!(parse_frame(r#"{"type":"telemetry"}"#).is_err());
/// ```
pub fn parse_frame(text: &str) -> Result<Frame> {
    let raw: RawFrame = serde_json::from_str(text)
        .map_err(|e| FgoChatError::Protocol(format!("malformed frame: {}", e)))?;

    let frame = match raw.kind.as_str() {
        "system" => Frame::System {
            content: raw.content.unwrap_or_default(),
        },
        "start" => Frame::Start,
        "token" => Frame::Token {
            content: raw.content.ok_or_else(|| {
                FgoChatError::Protocol("token frame without content".to_string())
            })?,
        },
        "end" => Frame::End {
            category: raw
                .question_type
                .as_deref()
                .map(Category::from_question_type)
                .unwrap_or_default(),
        },
        "error" => Frame::Error {
            content: raw.content.unwrap_or_default(),
        },
        "pong" => Frame::Pong,
        other => {
            return Err(FgoChatError::Protocol(format!("unknown frame type: {}", other)).into())
        }
    };

    Ok(frame)
}

/// Frames the client sends
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// A user chat message
    Message { content: String },
    /// Heartbeat
    Ping,
}

impl OutboundFrame {
    /// Serialize to the JSON text sent on the wire
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
