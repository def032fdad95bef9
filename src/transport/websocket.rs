//! WebSocket connector for `{ws_base}/ws/chat/{session_id}`

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::{Connection, Connector};
use crate::config::Config;
use crate::error::{FgoChatError, Result};
use crate::protocol::OutboundFrame;

/// Opens one WebSocket per session against the agent service
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    base_url: String,
    heartbeat: Option<Duration>,
}

impl WebSocketConnector {
    /// Create a connector from the server and transport settings
    ///
    /// # Errors
    ///
    /// Returns error if no WebSocket base URL can be derived
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            base_url: config.server.websocket_base()?,
            heartbeat: config.transport.heartbeat_interval(),
        })
    }

    /// Connection URL for a session
    pub fn session_url(&self, session_id: &str) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.base_url).map_err(|e| {
            FgoChatError::Config(format!("Invalid WebSocket URL '{}': {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                FgoChatError::Config(format!("WebSocket URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(["ws", "chat", session_id]);
        Ok(url)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, session_id: &str) -> Result<Connection> {
        let url = self.session_url(session_id)?;
        tracing::debug!(%url, "Connecting WebSocket");

        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| FgoChatError::Transport(format!("Failed to connect to {}: {}", url, e)))?;

        let (mut sink, stream) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let mut heartbeat = self
            .heartbeat
            .map(|period| tokio::time::interval_at(Instant::now() + period, period));

        // Writer: user frames and heartbeats share the sink. Ends when the
        // manager drops the outbound sender or the socket breaks.
        tokio::spawn(async move {
            loop {
                let text = tokio::select! {
                    next = outbound_rx.recv() => match next {
                        Some(text) => text,
                        None => break,
                    },
                    _ = tick(&mut heartbeat) => match OutboundFrame::Ping.to_text() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!("Failed to encode heartbeat: {}", e);
                            continue;
                        }
                    },
                };

                if let Err(e) = sink.send(WsMessage::Text(text)).await {
                    tracing::debug!("WebSocket writer stopped: {}", e);
                    return;
                }
            }
            let _ = sink.close().await;
        });

        let inbound = stream
            .filter_map(|message| {
                futures::future::ready(match message {
                    Ok(WsMessage::Text(text)) => Some(Ok(text)),
                    Ok(WsMessage::Close(frame)) => {
                        tracing::debug!(?frame, "WebSocket close frame");
                        None
                    }
                    Ok(_) => None,
                    Err(e) => Some(Err(anyhow::Error::from(FgoChatError::WebSocket(e)))),
                })
            })
            .boxed();

        Ok(Connection { outbound, inbound })
    }
}

/// Wait for the next heartbeat, or forever when heartbeats are disabled
async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
