//! FGO Chat - terminal client library for the FGO game assistant
//!
//! This library provides the client side of the FGO assistant: session
//! management over HTTP, a per-session streaming WebSocket connection
//! with automatic reconnect, and assembly of streamed responses into a
//! conversation transcript.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `directory`: Session directory (list, create, history, health) over HTTP
//! - `transport`: Binds one streaming connection to the active session
//! - `protocol`: Wire frames of the streaming connection
//! - `stream`: Turns start/token/end/error frames into message updates
//! - `conversation`: Ordered message transcript with stable handles
//! - `controller`: Serializes user commands and network events
//! - `render`: Terminal output of controller events
//! - `identity`: Local anonymous user identity
//! - `export`: Plain text transcript export
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use fgo_chat::{Config, HttpSessionDirectory, SessionDirectory};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let directory = HttpSessionDirectory::new(&config.server)?;
//!     let health = directory.health().await?;
//!     println!("service is {}", health.status);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod directory;
pub mod error;
pub mod export;
pub mod identity;
pub mod protocol;
pub mod render;
pub mod stream;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use controller::{ChatController, ControllerHandle, Startup, UiEvent, UserCommand};
pub use conversation::{Category, ConversationView, Message, MessageStatus, Role};
pub use directory::{HttpSessionDirectory, Session, SessionDirectory};
pub use error::{FgoChatError, Result};
pub use identity::{Identity, IdentityStore};
pub use stream::{StreamCoordinator, StreamState};
pub use transport::{ConnectionState, Connector, TransportManager, WebSocketConnector};

#[cfg(test)]
pub mod test_utils;
