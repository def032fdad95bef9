//! Binding lifecycle for the active session's connection

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::{Connection, ConnectionState, Connector, TransportEvent, TransportEventKind};
use crate::controller::Event;
use crate::error::{FgoChatError, Result};
use crate::protocol::OutboundFrame;

/// Owns the single live connection and its reconnect timer
///
/// All methods are called from the controller queue. Connection I/O runs
/// on spawned tasks that only ever post [`Event`]s back to that queue, so
/// the manager itself needs no locking.
#[derive(Debug)]
pub struct TransportManager {
    connector: Arc<dyn Connector>,
    events: mpsc::UnboundedSender<Event>,
    reconnect_delay: Duration,
    generation: u64,
    session_id: Option<String>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    connection_task: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
    state_tx: watch::Sender<ConnectionState>,
}

impl TransportManager {
    /// Create an unbound manager
    ///
    /// # Arguments
    ///
    /// * `connector` - Opens connections
    /// * `events` - The controller queue connection activity is posted to
    /// * `reconnect_delay` - Fixed wait between a disconnect and the retry
    pub fn new(
        connector: Arc<dyn Connector>,
        events: mpsc::UnboundedSender<Event>,
        reconnect_delay: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            events,
            reconnect_delay,
            generation: 0,
            session_id: None,
            outbound: None,
            connection_task: None,
            reconnect_task: None,
            state_tx,
        }
    }

    /// Current connectivity
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Observe connectivity changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Generation of the current binding
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Session the binding targets
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Whether a reconnect timer is outstanding
    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_task.is_some()
    }

    /// Bind the transport to `session_id`
    ///
    /// Any previous connection is dropped and its later events become
    /// stale. While a reconnect is pending the timer is kept instead, and
    /// it connects to whichever session is active when it fires.
    ///
    /// Returns `true` if a connection attempt was started.
    pub fn bind(&mut self, session_id: &str) -> bool {
        if self.reconnect_pending() && self.state() == ConnectionState::Disconnected {
            tracing::info!(
                session_id = %session_id,
                generation = self.generation,
                "Reconnect pending, binding deferred until it fires"
            );
            self.session_id = Some(session_id.to_string());
            return false;
        }

        self.connect(session_id);
        true
    }

    /// Drop the binding and cancel any pending reconnect
    pub fn unbind(&mut self) {
        self.teardown();
        self.generation += 1;
        self.session_id = None;
        self.set_state(ConnectionState::Disconnected);
        tracing::debug!(generation = self.generation, "Transport unbound");
    }

    /// Send one frame on the live connection
    ///
    /// # Errors
    ///
    /// Returns [`FgoChatError::NotConnected`] unless the binding is
    /// connected. Nothing is queued for later delivery.
    pub fn send(&self, frame: &OutboundFrame) -> Result<()> {
        let outbound = match (&self.outbound, self.state()) {
            (Some(outbound), ConnectionState::Connected) => outbound,
            _ => return Err(FgoChatError::NotConnected.into()),
        };

        let text = frame.to_text()?;
        outbound.send(text).map_err(|_| {
            FgoChatError::Transport("connection writer has shut down".to_string()).into()
        })
    }

    /// Apply connection activity
    ///
    /// Events from superseded generations are ignored. Returns the frame
    /// text when the event carried one for the live connection.
    pub fn handle_event(&mut self, event: TransportEvent) -> Option<String> {
        if event.generation != self.generation {
            tracing::debug!(
                event_generation = event.generation,
                generation = self.generation,
                "Discarding stale transport event"
            );
            return None;
        }

        match event.kind {
            TransportEventKind::Opened(outbound) => {
                tracing::info!(
                    session_id = ?self.session_id,
                    generation = self.generation,
                    "Connected"
                );
                self.outbound = Some(outbound);
                self.set_state(ConnectionState::Connected);
                None
            }
            TransportEventKind::Frame(text) => Some(text),
            TransportEventKind::Closed => {
                tracing::info!(session_id = ?self.session_id, "Connection closed by peer");
                self.on_disconnect();
                None
            }
            TransportEventKind::Failed(reason) => {
                tracing::warn!(session_id = ?self.session_id, "Transport error: {}", reason);
                self.on_disconnect();
                None
            }
        }
    }

    /// Fire a reconnect scheduled for `generation`
    ///
    /// Connects to `active`, the session active right now. Returns `true`
    /// if a connection attempt was started.
    pub fn reconnect_due(&mut self, generation: u64, active: Option<&str>) -> bool {
        if generation != self.generation || self.reconnect_task.is_none() {
            tracing::debug!(generation, "Discarding stale reconnect");
            return false;
        }
        self.reconnect_task = None;

        match active {
            Some(session_id) => {
                tracing::info!(session_id = %session_id, "Reconnecting");
                self.connect(session_id);
                true
            }
            None => {
                tracing::debug!("Reconnect fired with no active session");
                false
            }
        }
    }

    fn connect(&mut self, session_id: &str) {
        self.teardown();
        self.generation += 1;
        self.session_id = Some(session_id.to_string());
        self.set_state(ConnectionState::Connecting);

        tracing::debug!(
            session_id = %session_id,
            generation = self.generation,
            "Opening connection"
        );

        self.connection_task = Some(tokio::spawn(run_connection(
            Arc::clone(&self.connector),
            session_id.to_string(),
            self.generation,
            self.events.clone(),
        )));
    }

    fn on_disconnect(&mut self) {
        self.outbound = None;
        self.connection_task = None;
        self.set_state(ConnectionState::Disconnected);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect_pending() {
            return;
        }

        let generation = self.generation;
        let delay = self.reconnect_delay;
        let events = self.events.clone();
        tracing::info!(generation, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");

        self.reconnect_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::ReconnectDue { generation });
        }));
    }

    fn teardown(&mut self) {
        if let Some(task) = self.connection_task.take() {
            task.abort();
        }
        if let Some(task) = self.reconnect_task.take() {
            task.abort();
        }
        self.outbound = None;
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!(from = %current, to = %state, "Connection state changed");
            *current = state;
            true
        });
    }
}

impl Drop for TransportManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Open one connection and forward its activity until it ends
async fn run_connection(
    connector: Arc<dyn Connector>,
    session_id: String,
    generation: u64,
    events: mpsc::UnboundedSender<Event>,
) {
    let post = |kind| {
        events
            .send(Event::Transport(TransportEvent { generation, kind }))
            .is_ok()
    };

    let Connection {
        outbound,
        mut inbound,
    } = match connector.connect(&session_id).await {
        Ok(connection) => connection,
        Err(e) => {
            post(TransportEventKind::Failed(format!("Failed to connect: {}", e)));
            return;
        }
    };

    if !post(TransportEventKind::Opened(outbound)) {
        return;
    }

    while let Some(item) = inbound.next().await {
        match item {
            Ok(text) => {
                if !post(TransportEventKind::Frame(text)) {
                    return;
                }
            }
            Err(e) => {
                post(TransportEventKind::Failed(e.to_string()));
                return;
            }
        }
    }

    post(TransportEventKind::Closed);
}
