//! Streaming transport
//!
//! One live connection per active session. [`TransportManager`] owns the
//! binding between the active session id and that connection, and turns
//! socket activity into events on the controller queue. Every connection
//! attempt is tagged with a generation; events from superseded
//! generations are discarded when they arrive.
//!
//! # Binding state machine
//!
//! | From         | Input                 | To           | Effect                                 |
//! |--------------|-----------------------|--------------|----------------------------------------|
//! | any          | `bind(id)`            | Connecting   | new generation, previous link dropped  |
//! | Connecting   | `Opened`              | Connected    | outbound sender stored                 |
//! | Connecting   | `Failed`              | Disconnected | one reconnect scheduled                |
//! | Connected    | `Closed` / `Failed`   | Disconnected | one reconnect scheduled                |
//! | Disconnected | `bind(id)` (pending)  | Disconnected | target updated, timer kept             |
//! | Disconnected | `ReconnectDue` (live) | Connecting   | connect to the active session          |
//! | any          | `unbind()`            | Disconnected | new generation, timer cancelled        |

mod manager;
mod websocket;

#[cfg(test)]
pub mod fake;

pub use manager::TransportManager;
pub use websocket::WebSocketConnector;

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use tokio::sync::mpsc;

/// Connectivity of the active session's binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No live connection
    #[default]
    Disconnected,
    /// A connection attempt is in flight
    Connecting,
    /// Frames can be sent
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// An open connection as handed out by a [`Connector`]
///
/// Dropping `outbound` closes the connection's write side.
pub struct Connection {
    /// Text frames to send, in order
    pub outbound: mpsc::UnboundedSender<String>,
    /// Text frames received, in order; ends when the peer closes
    pub inbound: BoxStream<'static, Result<String>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("outbound_closed", &self.outbound.is_closed())
            .finish_non_exhaustive()
    }
}

/// Opens streaming connections scoped to a session
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Open a connection for `session_id`
    async fn connect(&self, session_id: &str) -> Result<Connection>;
}

/// What happened on a connection
#[derive(Debug)]
pub enum TransportEventKind {
    /// The connection is established
    Opened(mpsc::UnboundedSender<String>),
    /// One text frame arrived
    Frame(String),
    /// The peer closed the connection
    Closed,
    /// Connecting failed or the connection broke
    Failed(String),
}

/// Connection activity tagged with the generation that produced it
#[derive(Debug)]
pub struct TransportEvent {
    /// Binding generation of the connection
    pub generation: u64,
    /// What happened
    pub kind: TransportEventKind,
}
