//! Conversation view model
//!
//! [`ConversationView`] holds the ordered messages of the active session.
//! It is append-only apart from two sanctioned in-place mutations on the
//! streaming assistant message: token concatenation and the category
//! back-fill when the response completes. Replacing or clearing the view
//! starts a new epoch, which invalidates every outstanding
//! [`MessageHandle`]. Prepending older history keeps handles valid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person at the keyboard
    User,
    /// The agent service
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "User"),
            Self::Assistant => write!(f, "Assistant"),
        }
    }
}

impl Role {
    /// Parse the wire representation (`"user"` / `"assistant"`)
    ///
    /// Returns `None` for anything else; callers decide how to treat
    /// unknown roles.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Classification the service assigns to an answered question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Answered from the local knowledge base
    KnowledgeBase,
    /// Answered from a web search
    WebSearch,
    /// Everything else
    #[default]
    General,
}

impl Category {
    /// Map the service's `question_type` string; unknown values are General
    pub fn from_question_type(s: &str) -> Self {
        match s {
            "knowledge_base" => Self::KnowledgeBase,
            "web_search" => Self::WebSearch,
            _ => Self::General,
        }
    }

    /// Short label shown next to a finished answer
    pub fn label(&self) -> &'static str {
        match self {
            Self::KnowledgeBase => "knowledge base",
            Self::WebSearch => "web search",
            Self::General => "general",
        }
    }
}

/// Lifecycle of a single message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Final content
    Complete,
    /// Assistant response still receiving tokens
    Streaming,
    /// Response failed; content holds the error text
    Errored,
}

/// One rendered chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Client-assigned identifier, unique within the process
    pub id: String,
    /// Author
    pub role: Role,
    /// Text content
    pub content: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Classification, only ever set on assistant messages
    pub category: Option<Category>,
    /// Lifecycle status
    pub status: MessageStatus,
}

impl Message {
    fn new(role: Role, content: String, status: MessageStatus) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            created_at: Utc::now(),
            category: None,
            status,
        }
    }

    /// A completed user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into(), MessageStatus::Complete)
    }

    /// An empty assistant message about to receive tokens
    pub fn streaming_assistant() -> Self {
        Self::new(Role::Assistant, String::new(), MessageStatus::Streaming)
    }

    /// A standalone errored assistant message
    pub fn errored(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into(), MessageStatus::Errored)
    }

    /// A completed message restored from stored history
    pub fn restored(
        role: Role,
        content: String,
        created_at: DateTime<Utc>,
        category: Option<Category>,
    ) -> Self {
        Self {
            created_at,
            category,
            ..Self::new(role, content, MessageStatus::Complete)
        }
    }

    /// Whether this is the in-flight assistant response
    pub fn is_streaming(&self) -> bool {
        self.status == MessageStatus::Streaming
    }
}

/// Stable reference to a message appended to a [`ConversationView`]
///
/// A handle stays valid until the view is replaced or cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    epoch: u64,
    index: usize,
}

/// In-memory ordered message list for the active session
#[derive(Debug, Default)]
pub struct ConversationView {
    messages: Vec<Message>,
    epoch: u64,
    // Messages prepended since the epoch began; handles index past them.
    offset: usize,
}

impl ConversationView {
    /// Create an empty view
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return a handle for later mutation
    pub fn append(&mut self, message: Message) -> MessageHandle {
        self.messages.push(message);
        MessageHandle {
            epoch: self.epoch,
            index: self.messages.len() - 1 - self.offset,
        }
    }

    /// Replace every message, e.g. after a session switch or history load
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.epoch += 1;
        self.offset = 0;
        self.messages = messages;
    }

    /// Insert older messages ahead of everything in the view
    ///
    /// Used when history arrives after the user has already started
    /// talking in a freshly selected session. Outstanding handles remain
    /// valid.
    pub fn prepend(&mut self, messages: Vec<Message>) {
        self.offset += messages.len();
        self.messages.splice(0..0, messages);
    }

    /// Drop every message (local only)
    pub fn clear(&mut self) {
        self.replace_all(Vec::new());
    }

    /// Look up a message by handle; `None` once the handle is stale
    pub fn get(&self, handle: MessageHandle) -> Option<&Message> {
        if handle.epoch != self.epoch {
            return None;
        }
        self.messages.get(handle.index + self.offset)
    }

    fn streaming_mut(&mut self, handle: MessageHandle) -> Option<&mut Message> {
        if handle.epoch != self.epoch {
            return None;
        }
        self.messages
            .get_mut(handle.index + self.offset)
            .filter(|m| m.role == Role::Assistant && m.is_streaming())
    }

    /// Append text to the streaming message
    ///
    /// Returns `false` (and changes nothing) when the handle is stale or
    /// the message is not a streaming assistant message.
    pub fn push_content(&mut self, handle: MessageHandle, text: &str) -> bool {
        match self.streaming_mut(handle) {
            Some(message) => {
                message.content.push_str(text);
                true
            }
            None => false,
        }
    }

    /// Mark the streaming message complete and back-fill its category
    pub fn complete(&mut self, handle: MessageHandle, category: Category) -> bool {
        match self.streaming_mut(handle) {
            Some(message) => {
                message.status = MessageStatus::Complete;
                message.category = Some(category);
                true
            }
            None => false,
        }
    }

    /// Mark the streaming message errored, optionally replacing its content
    pub fn fail(&mut self, handle: MessageHandle, content: Option<String>) -> bool {
        match self.streaming_mut(handle) {
            Some(message) => {
                message.status = MessageStatus::Errored;
                if let Some(content) = content {
                    message.content = content;
                }
                true
            }
            None => false,
        }
    }

    /// All messages, oldest first
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages currently streaming (0 or 1 in a correct client)
    pub fn streaming_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_streaming()).count()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the view holds no messages
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
