//! In-process fake connector for transport and controller tests
//!
//! [`FakeConnector::new`] returns the connector together with a
//! [`FakeServer`] handle. Every successful `connect` hands the test a
//! [`FakeLink`] through `FakeServer::links`:
//!
//! ```text
//! manager send() ----> link.outbound_rx   (test reads what the client sent)
//! link.inbound_tx ---> connection inbound (test injects server frames)
//! drop(link.inbound_tx)                   (test closes the connection)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::{Connection, Connector};
use crate::error::{FgoChatError, Result};

/// Connector whose connections are driven by the test
#[derive(Debug, Clone)]
pub struct FakeConnector {
    links_tx: mpsc::UnboundedSender<FakeLink>,
    attempts: Arc<Mutex<Vec<String>>>,
    refuse: Arc<AtomicBool>,
}

/// Test-side view of a [`FakeConnector`]
#[derive(Debug)]
pub struct FakeServer {
    /// One link per successful connect, in connect order
    pub links: mpsc::UnboundedReceiver<FakeLink>,
    attempts: Arc<Mutex<Vec<String>>>,
    refuse: Arc<AtomicBool>,
}

/// Server end of one fake connection
#[derive(Debug)]
pub struct FakeLink {
    /// Session the client connected for
    pub session_id: String,
    /// Frames the client sent
    pub outbound_rx: mpsc::UnboundedReceiver<String>,
    /// Frames to deliver to the client; drop to close the connection
    pub inbound_tx: mpsc::UnboundedSender<Result<String>>,
}

impl FakeLink {
    /// Deliver one text frame to the client
    pub fn push(&self, text: &str) {
        self.inbound_tx
            .send(Ok(text.to_string()))
            .expect("FakeLink: client dropped the connection");
    }

    /// Break the connection with an error
    pub fn fail(self, reason: &str) {
        let _ = self
            .inbound_tx
            .send(Err(FgoChatError::Transport(reason.to_string()).into()));
    }
}

impl FakeConnector {
    /// Create a connector and its test handle
    pub fn new() -> (Self, FakeServer) {
        let (links_tx, links) = mpsc::unbounded_channel();
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let refuse = Arc::new(AtomicBool::new(false));

        let connector = Self {
            links_tx,
            attempts: Arc::clone(&attempts),
            refuse: Arc::clone(&refuse),
        };
        let server = FakeServer {
            links,
            attempts,
            refuse,
        };
        (connector, server)
    }
}

impl FakeServer {
    /// Session ids of every connect attempt so far, successful or not
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().expect("attempts lock poisoned").clone()
    }

    /// Make subsequent connects fail (or succeed again)
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, session_id: &str) -> Result<Connection> {
        self.attempts
            .lock()
            .expect("attempts lock poisoned")
            .push(session_id.to_string());

        if self.refuse.load(Ordering::SeqCst) {
            return Err(FgoChatError::Transport("connection refused".to_string()).into());
        }

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Result<String>>();

        let link = FakeLink {
            session_id: session_id.to_string(),
            outbound_rx,
            inbound_tx,
        };
        self.links_tx
            .send(link)
            .map_err(|_| FgoChatError::Transport("fake server dropped".to_string()))?;

        let inbound = futures::stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed();

        Ok(Connection { outbound, inbound })
    }
}
