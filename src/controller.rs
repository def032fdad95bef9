//! Chat controller
//!
//! The controller is the single consumer of one event queue. User
//! commands, transport activity, reconnect timers, and completions of
//! HTTP requests are all posted to that queue and handled one at a time,
//! so the conversation view, the stream coordinator, and the transport
//! binding are only ever touched from here.
//!
//! Asynchronous work (directory requests, socket I/O, timers) runs on
//! spawned tasks that post their result back as an [`Event`]. Results
//! that belong to a session which is no longer active are recognised by
//! their [`SessionContext`] generation and dropped.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::conversation::{ConversationView, Message};
use crate::directory::{Session, SessionDirectory};
use crate::error::Result;
use crate::export;
use crate::identity::Identity;
use crate::protocol::{parse_frame, OutboundFrame};
use crate::stream::{StreamCoordinator, StreamState, StreamUpdate};
use crate::transport::{ConnectionState, Connector, TransportEvent, TransportManager};

/// Name given to the session created when a user has none
pub const DEFAULT_SESSION_NAME: &str = "新对话";

/// Something the user asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Send a chat message on the active session
    Send(String),
    /// Make a session active, by id or by `#n` position in the last listing
    SelectSession(String),
    /// Create a session with this name and make it active
    CreateSession(String),
    /// Re-fetch the session list
    RefreshSessions,
    /// Clear the transcript locally (nothing is deleted server-side)
    ClearHistory,
    /// Export the transcript, optionally into a specific directory
    Export(Option<PathBuf>),
    /// Report the current status
    Status,
    /// Stop the controller
    Shutdown,
}

/// One unit of work on the controller queue
#[derive(Debug)]
pub enum Event {
    /// User input
    User(UserCommand),
    /// Activity on a transport connection
    Transport(TransportEvent),
    /// A reconnect delay elapsed
    ReconnectDue { generation: u64 },
    /// A history request finished
    HistoryLoaded {
        session_id: String,
        generation: u64,
        result: Result<Vec<Message>>,
    },
    /// A session list request finished
    SessionsLoaded {
        result: Result<Vec<Session>>,
        select_first: bool,
    },
    /// A session create request finished
    SessionCreated(Result<Session>),
}

/// Severity of a transient notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Snapshot returned for [`UserCommand::Status`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Local display name
    pub username: String,
    /// Active session, if any
    pub session: Option<Session>,
    pub connection: ConnectionState,
    pub stream: StreamState,
    /// Messages in the transcript
    pub messages: usize,
    /// Whether a reconnect timer is running
    pub reconnect_pending: bool,
}

/// What the terminal should show
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Connectivity indicator changed
    ConnectionChanged(ConnectionState),
    /// Composer became enabled or disabled
    ComposerEnabled(bool),
    /// The session list was (re)loaded
    SessionsListed {
        sessions: Vec<Session>,
        active: Option<String>,
    },
    /// A session became active; its transcript starts empty
    SessionSelected(Session),
    /// The whole transcript must be redrawn
    HistoryReplaced(Vec<Message>),
    /// A message was appended
    MessageAppended(Message),
    /// Text was appended to the streaming message
    TokenAppended { message_id: String, text: String },
    /// A message reached its final status
    MessageFinished(Message),
    /// The transcript was cleared locally
    Cleared,
    /// A transcript was written to disk
    Exported(PathBuf),
    /// Status snapshot
    Status(StatusReport),
    /// Transient notification
    Notice { level: NoticeLevel, text: String },
}

/// Which session the controller opens first
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Startup {
    /// The most recently active session, creating one if there are none
    #[default]
    MostRecent,
    /// A specific session id
    Session(String),
    /// A new session with this name
    New(String),
}

/// Active session plus a generation that changes on every switch or clear
///
/// Async completions capture the generation when they are started and
/// are applied only if it is still current when they arrive.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionContext {
    active: Option<String>,
    generation: u64,
}

impl SessionContext {
    /// Make `session_id` active and return the new generation
    pub fn activate(&mut self, session_id: &str) -> u64 {
        self.active = Some(session_id.to_string());
        self.generation += 1;
        self.generation
    }

    /// Keep the active session but supersede everything started so far
    pub fn invalidate(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// The active session id
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Current generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a completion tagged `(session_id, generation)` still applies
    pub fn is_current(&self, session_id: &str, generation: u64) -> bool {
        self.generation == generation && self.active.as_deref() == Some(session_id)
    }
}

/// Cloneable handle for posting commands to a running controller
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl ControllerHandle {
    /// Post a user command
    ///
    /// # Errors
    ///
    /// Returns error if the controller has stopped
    pub fn command(&self, command: UserCommand) -> Result<()> {
        self.tx
            .send(Event::User(command))
            .map_err(|_| anyhow::anyhow!("Chat controller has stopped"))
    }
}

/// Owns every piece of chat state and processes the event queue
#[derive(Debug)]
pub struct ChatController {
    identity: Identity,
    directory: Arc<dyn SessionDirectory>,
    transport: TransportManager,
    coordinator: StreamCoordinator,
    view: ConversationView,
    context: SessionContext,
    sessions: Vec<Session>,
    history_limit: usize,
    export_dir: PathBuf,
    composer_enabled: bool,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    ui: mpsc::UnboundedSender<UiEvent>,
}

impl ChatController {
    /// Create a controller and the handle used to send it commands
    ///
    /// # Arguments
    ///
    /// * `config` - Transport, history, and export settings
    /// * `identity` - The local user
    /// * `directory` - Session directory
    /// * `connector` - Opens streaming connections
    /// * `ui` - Where rendering events are sent
    pub fn new(
        config: &Config,
        identity: Identity,
        directory: Arc<dyn SessionDirectory>,
        connector: Arc<dyn Connector>,
        ui: mpsc::UnboundedSender<UiEvent>,
    ) -> (Self, ControllerHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = TransportManager::new(
            connector,
            events_tx.clone(),
            config.transport.reconnect_delay(),
        );
        let export_dir = config.export.output_dir();

        let handle = ControllerHandle {
            tx: events_tx.clone(),
        };
        let controller = Self {
            identity,
            directory,
            transport,
            coordinator: StreamCoordinator::new(),
            view: ConversationView::new(),
            context: SessionContext::default(),
            sessions: Vec::new(),
            history_limit: config.history.limit,
            export_dir,
            composer_enabled: false,
            events_tx,
            events_rx,
            ui,
        };
        (controller, handle)
    }

    /// Process events until shutdown or until every handle is dropped
    pub async fn run(mut self, startup: Startup) -> Result<()> {
        self.start(startup);
        while self.step().await {}
        self.transport.unbind();
        tracing::debug!("Chat controller stopped");
        Ok(())
    }

    /// Kick off the initial session selection
    pub fn start(&mut self, startup: Startup) {
        tracing::debug!(?startup, user_id = %self.identity.user_id, "Starting chat controller");
        match startup {
            Startup::MostRecent => self.request_sessions(true),
            Startup::Session(session_id) => {
                self.request_sessions(false);
                self.select(&session_id);
            }
            Startup::New(name) => {
                self.request_sessions(false);
                self.request_create(name);
            }
        }
    }

    /// Wait for and handle the next event; returns `false` to stop
    pub async fn step(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => self.handle(event),
            None => false,
        }
    }

    /// Handle one event to completion; returns `false` to stop
    pub fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::User(UserCommand::Shutdown) => return false,
            Event::User(command) => self.on_command(command),
            Event::Transport(event) => self.on_transport(event),
            Event::ReconnectDue { generation } => {
                let active = self.context.active().map(str::to_string);
                if self.transport.reconnect_due(generation, active.as_deref()) {
                    self.emit(UiEvent::ConnectionChanged(self.transport.state()));
                }
            }
            Event::HistoryLoaded {
                session_id,
                generation,
                result,
            } => self.on_history(session_id, generation, result),
            Event::SessionsLoaded {
                result,
                select_first,
            } => self.on_sessions(result, select_first),
            Event::SessionCreated(result) => match result {
                Ok(session) => {
                    let id = session.id.clone();
                    self.sessions.insert(0, session);
                    self.select(&id);
                }
                Err(e) => self.notify_error(format!("Failed to create session: {}", e)),
            },
        }
        self.update_composer();
        true
    }

    /// Whether the composer accepts input right now
    pub fn can_send(&self) -> bool {
        self.transport.state() == ConnectionState::Connected && !self.coordinator.is_streaming()
    }

    fn on_command(&mut self, command: UserCommand) {
        match command {
            UserCommand::Send(text) => self.send(text),
            UserCommand::SelectSession(reference) => match self.resolve_session(&reference) {
                Some(id) => self.select(&id),
                None => self.notify_error(format!("Unknown session: {}", reference)),
            },
            UserCommand::CreateSession(name) => self.request_create(name),
            UserCommand::RefreshSessions => {
                let select_first = self.context.active().is_none();
                self.request_sessions(select_first);
            }
            UserCommand::ClearHistory => {
                // A history load still in flight must not refill the transcript.
                self.context.invalidate();
                self.view.clear();
                self.coordinator.reset();
                self.emit(UiEvent::Cleared);
            }
            UserCommand::Export(dir) => self.export(dir),
            UserCommand::Status => {
                let report = self.status();
                self.emit(UiEvent::Status(report));
            }
            UserCommand::Shutdown => {}
        }
    }

    fn send(&mut self, text: String) {
        let content = text.trim();
        if content.is_empty() {
            return;
        }

        if !self.can_send() {
            let reason = if self.coordinator.is_streaming() {
                "a response is still streaming"
            } else {
                "not connected"
            };
            self.notify_error(format!("Cannot send: {}", reason));
            return;
        }

        let message = Message::user(content);
        self.view.append(message.clone());
        self.emit(UiEvent::MessageAppended(message));

        let frame = OutboundFrame::Message {
            content: content.to_string(),
        };
        match self.transport.send(&frame) {
            Ok(()) => self.coordinator.request_sent(),
            Err(e) => self.notify_error(format!("Failed to send message: {}", e)),
        }
    }

    fn select(&mut self, session_id: &str) {
        if self.context.active() == Some(session_id) {
            self.notify_info(format!("Session {} is already active", session_id));
            return;
        }

        let generation = self.context.activate(session_id);
        self.view.clear();
        self.coordinator.reset();
        tracing::info!(session_id = %session_id, generation, "Selected session");

        let session = self.known_session(session_id);
        self.emit(UiEvent::SessionSelected(session));

        self.transport.bind(session_id);
        self.emit(UiEvent::ConnectionChanged(self.transport.state()));
        self.request_history(session_id.to_string(), generation);
    }

    fn on_transport(&mut self, event: TransportEvent) {
        let before = self.transport.state();
        let text = self.transport.handle_event(event);
        let after = self.transport.state();

        if before != after {
            if after == ConnectionState::Disconnected {
                self.abandon_stream();
            }
            self.emit(UiEvent::ConnectionChanged(after));
        }

        let Some(text) = text else {
            return;
        };

        let frame = match parse_frame(&text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("{}; ignoring frame", e);
                return;
            }
        };
        tracing::debug!(kind = frame.kind(), "Inbound frame");

        for update in self.coordinator.handle_frame(frame, &mut self.view) {
            self.apply_update(update);
        }
    }

    /// A response cannot finish once its connection is gone
    fn abandon_stream(&mut self) {
        if let Some(handle) = self.coordinator.current() {
            if self.coordinator.is_streaming() && self.view.fail(handle, None) {
                tracing::warn!("Connection lost while a response was streaming");
                self.apply_update(StreamUpdate::Finished(handle));
            }
        }
        self.coordinator.reset();
    }

    fn apply_update(&mut self, update: StreamUpdate) {
        let event = match update {
            StreamUpdate::Appended(handle) => self
                .view
                .get(handle)
                .map(|m| UiEvent::MessageAppended(m.clone())),
            StreamUpdate::Token { handle, text } => {
                self.view.get(handle).map(|m| UiEvent::TokenAppended {
                    message_id: m.id.clone(),
                    text,
                })
            }
            StreamUpdate::Finished(handle) => self
                .view
                .get(handle)
                .map(|m| UiEvent::MessageFinished(m.clone())),
            StreamUpdate::Notice(text) => Some(UiEvent::Notice {
                level: NoticeLevel::Error,
                text,
            }),
        };
        if let Some(event) = event {
            self.emit(event);
        }
    }

    fn on_history(&mut self, session_id: String, generation: u64, result: Result<Vec<Message>>) {
        if !self.context.is_current(&session_id, generation) {
            tracing::debug!(
                session_id = %session_id,
                generation,
                current = self.context.generation(),
                "Discarding stale history"
            );
            return;
        }

        match result {
            Ok(messages) => {
                tracing::debug!(session_id = %session_id, count = messages.len(), "History loaded");
                if self.view.is_empty() {
                    self.view.replace_all(messages);
                } else {
                    self.view.prepend(messages);
                }
                self.emit(UiEvent::HistoryReplaced(self.view.messages().to_vec()));
            }
            Err(e) => self.notify_error(format!("Failed to load history: {}", e)),
        }
    }

    fn on_sessions(&mut self, result: Result<Vec<Session>>, select_first: bool) {
        let sessions = match result {
            Ok(sessions) => sessions,
            Err(e) => {
                self.notify_error(format!("Failed to list sessions: {}", e));
                return;
            }
        };

        self.sessions = sessions;
        self.emit(UiEvent::SessionsListed {
            sessions: self.sessions.clone(),
            active: self.context.active().map(str::to_string),
        });

        if select_first && self.context.active().is_none() {
            match self.sessions.first().map(|s| s.id.clone()) {
                Some(id) => self.select(&id),
                None => self.request_create(DEFAULT_SESSION_NAME.to_string()),
            }
        }
    }

    fn export(&mut self, dir: Option<PathBuf>) {
        let Some(session_id) = self.context.active().map(str::to_string) else {
            self.notify_error("No active session to export".to_string());
            return;
        };
        let dir = dir.unwrap_or_else(|| self.export_dir.clone());

        match export::write_transcript(&dir, &session_id, self.view.messages()) {
            Ok(path) => self.emit(UiEvent::Exported(path)),
            Err(e) => self.notify_error(e.to_string()),
        }
    }

    fn status(&self) -> StatusReport {
        StatusReport {
            username: self.identity.username.clone(),
            session: self.context.active().map(|id| self.known_session(id)),
            connection: self.transport.state(),
            stream: self.coordinator.state(),
            messages: self.view.len(),
            reconnect_pending: self.transport.reconnect_pending(),
        }
    }

    /// Resolve an id or a 1-based `#n` index into the last listing
    fn resolve_session(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if let Some(index) = reference.strip_prefix('#') {
            let n: usize = index.parse().ok()?;
            return self
                .sessions
                .get(n.checked_sub(1)?)
                .map(|s| s.id.clone());
        }
        (!reference.is_empty()).then(|| reference.to_string())
    }

    /// The listed session with this id, or a placeholder record
    fn known_session(&self, session_id: &str) -> Session {
        self.sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
            .unwrap_or_else(|| Session {
                id: session_id.to_string(),
                display_name: session_id.to_string(),
                created_at: chrono::Utc::now(),
                last_active: None,
            })
    }

    fn request_sessions(&self, select_first: bool) {
        let directory = Arc::clone(&self.directory);
        let user_id = self.identity.user_id.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = directory.list_active(&user_id).await;
            let _ = tx.send(Event::SessionsLoaded {
                result,
                select_first,
            });
        });
    }

    fn request_create(&self, name: String) {
        let directory = Arc::clone(&self.directory);
        let identity = self.identity.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = directory
                .create(&identity.user_id, &identity.username, &name)
                .await;
            let _ = tx.send(Event::SessionCreated(result));
        });
    }

    fn request_history(&self, session_id: String, generation: u64) {
        let directory = Arc::clone(&self.directory);
        let limit = self.history_limit;
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = directory.load_history(&session_id, limit).await;
            let _ = tx.send(Event::HistoryLoaded {
                session_id,
                generation,
                result,
            });
        });
    }

    fn update_composer(&mut self) {
        let enabled = self.can_send();
        if enabled != self.composer_enabled {
            self.composer_enabled = enabled;
            self.emit(UiEvent::ComposerEnabled(enabled));
        }
    }

    fn notify_info(&self, text: String) {
        self.emit(UiEvent::Notice {
            level: NoticeLevel::Info,
            text,
        });
    }

    fn notify_error(&self, text: String) {
        tracing::warn!("{}", text);
        self.emit(UiEvent::Notice {
            level: NoticeLevel::Error,
            text,
        });
    }

    fn emit(&self, event: UiEvent) {
        if self.ui.send(event).is_err() {
            tracing::debug!("UI receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Category, MessageStatus, Role};
    use crate::directory::HealthStatus;
    use crate::test_utils::{temp_dir, test_config};
    use crate::transport::fake::{FakeConnector, FakeLink, FakeServer};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// In-memory directory; history for gated sessions waits for a notify
    #[derive(Debug, Default)]
    struct StubDirectory {
        sessions: Mutex<Vec<Session>>,
        histories: Mutex<HashMap<String, Vec<Message>>>,
        gates: Mutex<HashMap<String, Arc<Notify>>>,
        created: Mutex<Vec<String>>,
    }

    impl StubDirectory {
        fn with_sessions(ids: &[&str]) -> Self {
            let stub = Self::default();
            *stub.sessions.lock().unwrap() = ids.iter().map(|id| session(id)).collect();
            stub
        }

        fn set_history(&self, session_id: &str, messages: Vec<Message>) {
            self.histories
                .lock()
                .unwrap()
                .insert(session_id.to_string(), messages);
        }

        fn gate(&self, session_id: &str) -> Arc<Notify> {
            let notify = Arc::new(Notify::new());
            self.gates
                .lock()
                .unwrap()
                .insert(session_id.to_string(), Arc::clone(&notify));
            notify
        }
    }

    #[async_trait]
    impl SessionDirectory for StubDirectory {
        async fn list_active(&self, _user_id: &str) -> Result<Vec<Session>> {
            Ok(self.sessions.lock().unwrap().clone())
        }

        async fn create(
            &self,
            _user_id: &str,
            _display_name: &str,
            session_name: &str,
        ) -> Result<Session> {
            let mut created = self.created.lock().unwrap();
            created.push(session_name.to_string());
            let mut s = session(&format!("created-{}", created.len()));
            s.display_name = session_name.to_string();
            Ok(s)
        }

        async fn load_history(&self, session_id: &str, _limit: usize) -> Result<Vec<Message>> {
            let gate = self.gates.lock().unwrap().get(session_id).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            Ok(self
                .histories
                .lock()
                .unwrap()
                .get(session_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn health(&self) -> Result<HealthStatus> {
            Ok(HealthStatus {
                status: "healthy".to_string(),
                timestamp: None,
            })
        }
    }

    fn session(id: &str) -> Session {
        Session {
            id: id.to_string(),
            display_name: format!("name of {}", id),
            created_at: chrono::Utc::now(),
            last_active: None,
        }
    }

    fn identity() -> Identity {
        Identity {
            user_id: "user_test".to_string(),
            username: "Master_1234".to_string(),
        }
    }

    struct Harness {
        controller: ChatController,
        handle: ControllerHandle,
        ui: mpsc::UnboundedReceiver<UiEvent>,
        server: FakeServer,
        directory: Arc<StubDirectory>,
    }

    impl Harness {
        fn new(directory: StubDirectory, config: &Config) -> Self {
            let (connector, server) = FakeConnector::new();
            let (ui_tx, ui) = mpsc::unbounded_channel();
            let directory = Arc::new(directory);
            let (controller, handle) = ChatController::new(
                config,
                identity(),
                Arc::clone(&directory) as Arc<dyn SessionDirectory>,
                Arc::new(connector),
                ui_tx,
            );
            Self {
                controller,
                handle,
                ui,
                server,
                directory,
            }
        }

        /// Process events until `pred` holds, failing after a (virtual) minute
        async fn pump_until<F>(&mut self, mut pred: F)
        where
            F: FnMut(&ChatController) -> bool,
        {
            let controller = &mut self.controller;
            tokio::time::timeout(Duration::from_secs(60), async {
                while !pred(controller) {
                    assert!(controller.step().await, "controller stopped");
                }
            })
            .await
            .expect("condition not reached");
        }

        async fn connected_link(&mut self) -> FakeLink {
            self.pump_until(|c| c.transport.state() == ConnectionState::Connected)
                .await;
            self.server.links.recv().await.expect("no link")
        }

        fn drain_ui(&mut self) -> Vec<UiEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.ui.try_recv() {
                events.push(event);
            }
            events
        }

        fn command(&self, command: UserCommand) {
            self.handle.command(command).unwrap();
        }

        /// Handle everything already queued, letting spawned tasks run first
        async fn settle(&mut self) {
            for _ in 0..10 {
                tokio::task::yield_now().await;
                while let Ok(event) = self.controller.events_rx.try_recv() {
                    assert!(self.controller.handle(event), "controller stopped");
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_without_sessions_creates_default() {
        let mut h = Harness::new(StubDirectory::default(), &test_config());
        h.controller.start(Startup::MostRecent);

        h.connected_link().await;

        assert_eq!(
            *h.directory.created.lock().unwrap(),
            [DEFAULT_SESSION_NAME.to_string()]
        );
        assert_eq!(h.controller.context.active(), Some("created-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_selects_first_session_and_loads_history() {
        let directory = StubDirectory::with_sessions(&["sess-a", "sess-b"]);
        directory.set_history(
            "sess-a",
            vec![Message::user("hi"), Message::user("there")],
        );
        let mut h = Harness::new(directory, &test_config());
        h.controller.start(Startup::MostRecent);

        h.pump_until(|c| c.view.len() == 2).await;
        let link = h.connected_link().await;

        assert_eq!(link.session_id, "sess-a");
        let events = h.drain_ui();
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::SessionsListed { sessions, .. } if sessions.len() == 2)));
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::HistoryReplaced(m) if m.len() == 2)));
        assert!(events.contains(&UiEvent::ComposerEnabled(true)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_disabled_while_streaming() {
        let mut h = Harness::new(StubDirectory::with_sessions(&["sess-a"]), &test_config());
        h.controller.start(Startup::MostRecent);
        let mut link = h.connected_link().await;
        assert!(h.controller.can_send());

        h.command(UserCommand::Send("阿尔托莉雅的宝具？".to_string()));
        h.settle().await;
        assert_eq!(
            link.outbound_rx.recv().await.unwrap(),
            r#"{"type":"message","content":"阿尔托莉雅的宝具？"}"#
        );
        assert_eq!(h.controller.coordinator.state(), StreamState::AwaitingStart);
        assert!(h.controller.can_send());

        link.push(r#"{"type":"start"}"#);
        h.pump_until(|c| c.coordinator.is_streaming()).await;
        assert!(!h.controller.can_send());
        assert!(h.drain_ui().contains(&UiEvent::ComposerEnabled(false)));

        // Sending mid-stream is refused and nothing goes out.
        h.command(UserCommand::Send("again".to_string()));
        h.settle().await;
        assert!(link.outbound_rx.try_recv().is_err());
        assert!(h
            .drain_ui()
            .iter()
            .any(|e| matches!(e, UiEvent::Notice { level: NoticeLevel::Error, .. })));

        link.push(r#"{"type":"token","content":"A"}"#);
        link.push(r#"{"type":"token","content":"B"}"#);
        link.push(r#"{"type":"end","question_type":"general"}"#);
        h.pump_until(|c| !c.coordinator.is_streaming()).await;

        assert!(h.controller.can_send());
        let events = h.drain_ui();
        assert!(events.contains(&UiEvent::ComposerEnabled(true)));

        let answer = h.controller.view.messages().last().unwrap().clone();
        assert_eq!(answer.role, Role::Assistant);
        assert_eq!(answer.content, "AB");
        assert_eq!(answer.status, MessageStatus::Complete);
        assert_eq!(answer.category, Some(Category::General));
        assert!(events.contains(&UiEvent::MessageFinished(answer)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_frame_renders_inline_and_reenables_send() {
        let mut h = Harness::new(StubDirectory::with_sessions(&["sess-a"]), &test_config());
        h.controller.start(Startup::MostRecent);
        let link = h.connected_link().await;

        link.push(r#"{"type":"start"}"#);
        link.push(r#"{"type":"error","content":"backend down"}"#);
        h.pump_until(|c| c.view.len() == 1 && !c.coordinator.is_streaming())
            .await;

        let message = &h.controller.view.messages()[0];
        assert_eq!(message.content, "错误: backend down");
        assert_eq!(message.status, MessageStatus::Errored);
        assert!(h.controller.can_send());
        assert!(h.drain_ui().contains(&UiEvent::Notice {
            level: NoticeLevel::Error,
            text: "backend down".to_string(),
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_input_is_not_sent() {
        let mut h = Harness::new(StubDirectory::with_sessions(&["sess-a"]), &test_config());
        h.controller.start(Startup::MostRecent);
        let mut link = h.connected_link().await;

        h.command(UserCommand::Send("   \n".to_string()));
        h.settle().await;
        assert!(link.outbound_rx.try_recv().is_err());
        assert!(h.controller.view.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_history_is_discarded() {
        let directory = StubDirectory::with_sessions(&["sess-a", "sess-b"]);
        directory.set_history("sess-a", vec![Message::user("from a")]);
        directory.set_history("sess-b", vec![Message::user("from b")]);
        let gate_a = directory.gate("sess-a");
        let mut h = Harness::new(directory, &test_config());

        h.controller.start(Startup::Session("sess-a".to_string()));
        h.command(UserCommand::SelectSession("sess-b".to_string()));
        h.pump_until(|c| c.context.active() == Some("sess-b") && !c.view.is_empty())
            .await;
        assert_eq!(h.controller.view.messages()[0].content, "from b");

        // Now let the superseded request for sess-a complete.
        gate_a.notify_one();
        h.settle().await;

        assert_eq!(h.controller.view.len(), 1);
        assert_eq!(h.controller.view.messages()[0].content, "from b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_history_is_merged_before_live_messages() {
        let directory = StubDirectory::with_sessions(&["sess-a"]);
        directory.set_history("sess-a", vec![Message::user("older")]);
        let gate = directory.gate("sess-a");
        let mut h = Harness::new(directory, &test_config());
        h.controller.start(Startup::MostRecent);
        let link = h.connected_link().await;

        h.command(UserCommand::Send("newer".to_string()));
        h.settle().await;
        link.push(r#"{"type":"start"}"#);
        h.pump_until(|c| c.coordinator.is_streaming()).await;

        gate.notify_one();
        h.pump_until(|c| c.view.len() == 3).await;
        link.push(r#"{"type":"token","content":"reply"}"#);
        link.push(r#"{"type":"end"}"#);
        h.pump_until(|c| !c.coordinator.is_streaming()).await;

        let contents: Vec<_> = h
            .controller
            .view
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, ["older", "newer", "reply"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_targets_session_active_at_fire_time() {
        let mut h = Harness::new(
            StubDirectory::with_sessions(&["sess-a", "sess-b"]),
            &test_config(),
        );
        h.controller.start(Startup::MostRecent);
        let link = h.connected_link().await;
        assert_eq!(link.session_id, "sess-a");

        drop(link);
        h.pump_until(|c| c.transport.state() == ConnectionState::Disconnected)
            .await;
        let closed_at = tokio::time::Instant::now();

        h.command(UserCommand::SelectSession("sess-b".to_string()));
        h.settle().await;
        assert_eq!(h.controller.context.active(), Some("sess-b"));
        assert_eq!(h.server.attempts(), ["sess-a"]);

        let link = h.connected_link().await;
        assert!(closed_at.elapsed() >= Duration::from_millis(3000));
        assert_eq!(link.session_id, "sess-b");
        assert_eq!(h.server.attempts(), ["sess-a", "sess-b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_mid_stream_errors_the_response() {
        let mut h = Harness::new(StubDirectory::with_sessions(&["sess-a"]), &test_config());
        h.controller.start(Startup::MostRecent);
        let link = h.connected_link().await;

        link.push(r#"{"type":"start"}"#);
        link.push(r#"{"type":"token","content":"half"}"#);
        h.pump_until(|c| c.view.messages().first().map(|m| m.content.as_str()) == Some("half"))
            .await;

        drop(link);
        h.pump_until(|c| c.transport.state() == ConnectionState::Disconnected)
            .await;

        assert_eq!(h.controller.view.streaming_count(), 0);
        assert_eq!(h.controller.view.messages()[0].status, MessageStatus::Errored);
        assert_eq!(h.controller.coordinator.state(), StreamState::Idle);
        assert!(!h.controller.can_send());

        h.connected_link().await;
        assert!(h.controller.can_send());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_history_is_local() {
        let directory = StubDirectory::with_sessions(&["sess-a"]);
        directory.set_history("sess-a", vec![Message::user("old")]);
        let mut h = Harness::new(directory, &test_config());
        h.controller.start(Startup::MostRecent);
        h.pump_until(|c| c.view.len() == 1).await;

        h.command(UserCommand::ClearHistory);
        h.settle().await;

        assert!(h.controller.view.is_empty());
        assert!(h.drain_ui().contains(&UiEvent::Cleared));
        assert_eq!(h.controller.context.active(), Some("sess-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_discards_pending_history() {
        let directory = StubDirectory::with_sessions(&["sess-a"]);
        directory.set_history("sess-a", vec![Message::user("old")]);
        let gate = directory.gate("sess-a");
        let mut h = Harness::new(directory, &test_config());
        h.controller.start(Startup::MostRecent);
        h.pump_until(|c| c.context.active() == Some("sess-a")).await;

        h.command(UserCommand::ClearHistory);
        h.settle().await;
        gate.notify_one();
        h.settle().await;

        assert!(h.controller.view.is_empty());
        assert_eq!(h.controller.context.active(), Some("sess-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_by_index_and_unknown_reference() {
        let mut h = Harness::new(
            StubDirectory::with_sessions(&["sess-a", "sess-b"]),
            &test_config(),
        );
        h.controller.start(Startup::MostRecent);
        h.connected_link().await;

        h.command(UserCommand::SelectSession("#2".to_string()));
        h.settle().await;
        assert_eq!(h.controller.context.active(), Some("sess-b"));

        h.drain_ui();
        h.command(UserCommand::SelectSession("#9".to_string()));
        h.settle().await;
        assert_eq!(h.controller.context.active(), Some("sess-b"));
        assert!(h
            .drain_ui()
            .iter()
            .any(|e| matches!(e, UiEvent::Notice { level: NoticeLevel::Error, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_writes_transcript() {
        let dir = temp_dir();
        let directory = StubDirectory::with_sessions(&["sess-a"]);
        directory.set_history("sess-a", vec![Message::user("hello")]);
        let mut h = Harness::new(directory, &test_config());
        h.controller.start(Startup::MostRecent);
        h.pump_until(|c| c.view.len() == 1).await;

        h.command(UserCommand::Export(Some(dir.path().to_path_buf())));
        h.settle().await;

        let path = h
            .drain_ui()
            .into_iter()
            .find_map(|e| match e {
                UiEvent::Exported(path) => Some(path),
                _ => None,
            })
            .expect("no export event");
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.contains("] User: hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_run() {
        let h = Harness::new(StubDirectory::with_sessions(&["sess-a"]), &test_config());
        h.command(UserCommand::Shutdown);
        let result = h.controller.run(Startup::MostRecent).await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_session_context_generations() {
        let mut context = SessionContext::default();
        let first = context.activate("a");
        let second = context.activate("b");

        assert!(second > first);
        assert!(!context.is_current("a", first));
        assert!(!context.is_current("b", first));
        assert!(context.is_current("b", second));

        let third = context.invalidate();
        assert_eq!(context.active(), Some("b"));
        assert!(!context.is_current("b", second));
        assert!(context.is_current("b", third));
    }
}
