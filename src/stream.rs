//! Response stream coordinator
//!
//! Interprets the ordered frames of one connection and drives the
//! conversation view through the lifecycle of each assistant response:
//!
//! ```text
//! Idle --send--> AwaitingStart --Start--> Streaming --Token*--> Streaming
//!                                              |--End----> Idle (Complete)
//!                                              |--Error--> Idle (Errored)
//! ```
//!
//! Protocol violations are corrected locally and logged; none of them is
//! fatal. At most one assistant message is streaming at any time.

use crate::conversation::{ConversationView, Message, MessageHandle};
use crate::protocol::Frame;

/// Prefix applied to error text shown inline in the transcript
pub const ERROR_PREFIX: &str = "错误: ";

/// Format error text the way it is rendered in the transcript
///
/// # Examples
///
/// ```
/// use fgo_chat::stream::format_error;
///
/// assert_eq!(format_error("backend down"), "错误: backend down");
/// ```
pub fn format_error(content: &str) -> String {
    format!("{}{}", ERROR_PREFIX, content)
}

/// Streaming state of the active session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// No response expected
    #[default]
    Idle,
    /// A message was sent; the response has not started yet
    AwaitingStart,
    /// A response is being received
    Streaming,
}

/// Rendering consequence of one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    /// A new message was appended to the view
    Appended(MessageHandle),
    /// Text was appended to the streaming message
    Token { handle: MessageHandle, text: String },
    /// A message reached a final status (complete or errored)
    Finished(MessageHandle),
    /// Something worth a transient notification
    Notice(String),
}

/// Drives the start/token/end/error lifecycle of assistant responses
#[derive(Debug, Default)]
pub struct StreamCoordinator {
    state: StreamState,
    current: Option<MessageHandle>,
}

impl StreamCoordinator {
    /// Create an idle coordinator
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Whether a response is being received
    pub fn is_streaming(&self) -> bool {
        self.state == StreamState::Streaming
    }

    /// Handle of the streaming message, if any
    pub fn current(&self) -> Option<MessageHandle> {
        self.current
    }

    /// Record that a user message was just sent
    pub fn request_sent(&mut self) {
        if self.state == StreamState::Idle {
            self.state = StreamState::AwaitingStart;
        }
    }

    /// Forget any in-flight response (session switch or cleared history)
    pub fn reset(&mut self) {
        if self.state != StreamState::Idle {
            tracing::debug!(state = ?self.state, "Stream coordinator reset");
        }
        self.state = StreamState::Idle;
        self.current = None;
    }

    /// Apply one inbound frame to the view
    ///
    /// # Arguments
    ///
    /// * `frame` - The decoded frame, in receipt order
    /// * `view` - The active session's conversation view
    ///
    /// # Returns
    ///
    /// The rendering updates the frame caused, in order
    pub fn handle_frame(&mut self, frame: Frame, view: &mut ConversationView) -> Vec<StreamUpdate> {
        match frame {
            Frame::System { content } => {
                tracing::info!(content = %content, "System frame");
                Vec::new()
            }
            Frame::Pong => {
                tracing::debug!("Heartbeat acknowledged");
                Vec::new()
            }
            Frame::Start => self.on_start(view),
            Frame::Token { content } => self.on_token(content, view),
            Frame::End { category } => match self.take_streaming() {
                Some(handle) => {
                    if !view.complete(handle, category) {
                        tracing::warn!("End frame for a message no longer in the view");
                        return Vec::new();
                    }
                    vec![StreamUpdate::Finished(handle)]
                }
                None => {
                    tracing::debug!(state = ?self.state, "Ignoring end frame outside a response");
                    Vec::new()
                }
            },
            Frame::Error { content } => self.on_error(content, view),
        }
    }

    fn on_start(&mut self, view: &mut ConversationView) -> Vec<StreamUpdate> {
        let mut updates = Vec::new();

        if let Some(previous) = self.take_streaming() {
            tracing::warn!("Protocol error: start frame while a response is streaming");
            if view.fail(previous, None) {
                updates.push(StreamUpdate::Finished(previous));
            }
        }

        let handle = view.append(Message::streaming_assistant());
        self.state = StreamState::Streaming;
        self.current = Some(handle);
        updates.push(StreamUpdate::Appended(handle));
        updates
    }

    fn on_token(&mut self, content: String, view: &mut ConversationView) -> Vec<StreamUpdate> {
        let Some(handle) = self.current.filter(|_| self.is_streaming()) else {
            tracing::warn!(
                state = ?self.state,
                len = content.len(),
                "Protocol error: token frame outside a response, discarding"
            );
            return Vec::new();
        };

        if !view.push_content(handle, &content) {
            tracing::warn!("Token for a message no longer in the view, discarding");
            return Vec::new();
        }

        vec![StreamUpdate::Token {
            handle,
            text: content,
        }]
    }

    fn on_error(&mut self, content: String, view: &mut ConversationView) -> Vec<StreamUpdate> {
        let formatted = format_error(&content);
        let notice = StreamUpdate::Notice(content);

        let finished = match self.take_streaming() {
            Some(handle) if view.fail(handle, Some(formatted.clone())) => {
                StreamUpdate::Finished(handle)
            }
            _ => StreamUpdate::Appended(view.append(Message::errored(formatted))),
        };

        vec![finished, notice]
    }

    /// Leave the streaming state, returning the handle that was streaming
    fn take_streaming(&mut self) -> Option<MessageHandle> {
        let was_streaming = self.is_streaming();
        let handle = self.current.take();
        self.state = StreamState::Idle;
        handle.filter(|_| was_streaming)
    }
}
