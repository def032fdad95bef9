//! Session directory
//!
//! Request/response access to the agent service's session records and
//! stored history. There is no state here: every call is one HTTP
//! round-trip, and failures are reported as [`FgoChatError::Network`]
//! without retry.

mod types;

pub use types::{history_to_messages, parse_timestamp, HealthStatus, HistoryEntry, Session};

use crate::config::ServerConfig;
use crate::conversation::Message;
use crate::error::{FgoChatError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use types::{CreateSessionRequest, SessionRecord};
use url::Url;

/// Remote store of sessions and their history
#[async_trait]
pub trait SessionDirectory: Send + Sync + std::fmt::Debug {
    /// List the user's active sessions, in the order the service returns them
    ///
    /// An empty list means the user has no sessions yet; callers are
    /// expected to create one.
    async fn list_active(&self, user_id: &str) -> Result<Vec<Session>>;

    /// Create a new session record
    ///
    /// Not idempotent: each call creates a new record.
    async fn create(
        &self,
        user_id: &str,
        display_name: &str,
        session_name: &str,
    ) -> Result<Session>;

    /// Load up to `limit` stored messages, oldest first
    async fn load_history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>>;

    /// Query the service's health endpoint
    async fn health(&self) -> Result<HealthStatus>;
}

/// [`SessionDirectory`] backed by the agent service's HTTP API
#[derive(Debug, Clone)]
pub struct HttpSessionDirectory {
    client: Client,
    base_url: Url,
    create_path: Vec<String>,
}

impl HttpSessionDirectory {
    /// Create a directory client for the configured server
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is invalid or the HTTP client cannot
    /// be built
    ///
    /// # Examples
    ///
    /// ```
    /// use fgo_chat::config::ServerConfig;
    /// use fgo_chat::directory::HttpSessionDirectory;
    ///
    /// let directory = HttpSessionDirectory::new(&ServerConfig::default());
    /// assert!(directory.is_ok());
    /// ```
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            FgoChatError::Config(format!("Invalid server URL '{}': {}", config.base_url, e))
        })?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("fgo-chat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FgoChatError::Network(format!("Failed to create HTTP client: {}", e)))?;

        tracing::debug!(base_url = %base_url, "Initialized session directory");

        let create_path = config
            .create_session_segments()
            .into_iter()
            .map(String::from)
            .collect();

        Ok(Self {
            client,
            base_url,
            create_path,
        })
    }

    /// Build an endpoint URL from path segments, escaping each segment
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                FgoChatError::Config(format!("Server URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
        what: &str,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "Failed to {}: {}", what, error_text);
            return Err(FgoChatError::Network(format!(
                "Failed to {}: HTTP {} {}",
                what, status, error_text
            ))
            .into());
        }

        response.json::<T>().await.map_err(|e| {
            FgoChatError::Network(format!("Failed to parse response ({}): {}", what, e)).into()
        })
    }
}

fn request_failed(what: &str, e: reqwest::Error) -> FgoChatError {
    tracing::warn!("Failed to {}: {}", what, e);
    FgoChatError::Network(format!("Failed to {}: {}", what, e))
}

#[async_trait]
impl SessionDirectory for HttpSessionDirectory {
    async fn list_active(&self, user_id: &str) -> Result<Vec<Session>> {
        let mut url = self.endpoint(&["api", "sessions", user_id])?;
        url.query_pairs_mut().append_pair("active_only", "true");
        tracing::debug!(%url, "Listing sessions");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_failed("list sessions", e))?;

        let records: Vec<SessionRecord> = Self::read_json(response, "list sessions").await?;
        Ok(records.into_iter().map(Session::from).collect())
    }

    async fn create(
        &self,
        user_id: &str,
        display_name: &str,
        session_name: &str,
    ) -> Result<Session> {
        let segments: Vec<&str> = self.create_path.iter().map(String::as_str).collect();
        let url = self.endpoint(&segments)?;
        let body = CreateSessionRequest {
            user_id,
            username: display_name,
            session_name,
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_failed("create session", e))?;

        let record: SessionRecord = Self::read_json(response, "create session").await?;
        let session = Session::from(record);
        tracing::info!(session_id = %session.id, name = %session.display_name, "Created session");
        Ok(session)
    }

    async fn load_history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let mut url = self.endpoint(&["api", "history", session_id])?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        tracing::debug!(%url, "Loading history");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_failed("load history", e))?;

        let entries: Vec<HistoryEntry> = Self::read_json(response, "load history").await?;
        Ok(history_to_messages(entries))
    }

    async fn health(&self) -> Result<HealthStatus> {
        let url = self.endpoint(&["health"])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_failed("check health", e))?;

        Self::read_json(response, "check health").await
    }
}
