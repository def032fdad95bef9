//! Error types for FGO Chat
//!
//! This module defines all error types used throughout the client,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for FGO Chat operations
///
/// The first four variants form the client's failure taxonomy: HTTP
/// failures against the agent service, protocol violations on the wire,
/// streaming transport failures, and sends attempted without a live
/// connection. The remaining variants wrap local failures.
#[derive(Error, Debug)]
pub enum FgoChatError {
    /// HTTP non-success response or unreachable service
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed or out-of-order frame, unknown frame type, unknown role
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Streaming connection failure or close
    #[error("Transport error: {0}")]
    Transport(String),

    /// A frame was sent while the connection was not established
    #[error("Not connected to the chat service")]
    NotConnected,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local identity file errors
    #[error("Identity error: {0}")]
    Identity(String),

    /// Transcript export errors
    #[error("Export error: {0}")]
    Export(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket protocol errors
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Result type alias for FGO Chat operations
///
/// Uses `anyhow::Error` so context can be attached freely; callers that
/// need to classify a failure can `downcast_ref::<FgoChatError>()`.
pub type Result<T> = anyhow::Result<T>;
