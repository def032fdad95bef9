//! Local identity bootstrap
//!
//! The agent service owns sessions per user id, but has no login. The
//! client generates a user id and a display name once, persists them as
//! two durable string values (`fgo_user_id`, `fgo_username`), and reuses
//! them on every run. There is no expiry and no server sync.

use crate::config::IdentityConfig;
use crate::error::{FgoChatError, Result};
use anyhow::Context;
use directories::ProjectDirs;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The local user as known to the agent service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque user id used to own sessions
    #[serde(rename = "fgo_user_id")]
    pub user_id: String,
    /// Display name sent when creating sessions
    #[serde(rename = "fgo_username")]
    pub username: String,
}

impl Identity {
    /// Generate a fresh random identity
    pub fn generate() -> Self {
        Self {
            user_id: generate_user_id(),
            username: generate_username(),
        }
    }
}

fn generate_user_id() -> String {
    format!("user_{}", uuid::Uuid::new_v4().simple())
}

fn generate_username() -> String {
    let suffix: u32 = rand::rng().random_range(1000..10000);
    format!("Master_{}", suffix)
}

/// Partially-populated identity file; missing values are regenerated
#[derive(Debug, Default, Deserialize)]
struct StoredIdentity {
    #[serde(rename = "fgo_user_id")]
    user_id: Option<String>,
    #[serde(rename = "fgo_username")]
    username: Option<String>,
}

/// File-backed store for the local identity
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    /// Open the store at the configured or default location
    ///
    /// # Errors
    ///
    /// Returns [`FgoChatError::Identity`] if no data directory can be
    /// determined for the platform.
    pub fn new(config: &IdentityConfig) -> Result<Self> {
        if let Some(path) = &config.path {
            return Ok(Self::with_path(path.clone()));
        }

        let proj_dirs = ProjectDirs::from("com", "fgo", "fgo-chat")
            .ok_or_else(|| FgoChatError::Identity("Could not determine data directory".into()))?;

        Ok(Self::with_path(proj_dirs.data_dir().join("identity.json")))
    }

    /// Open the store at an explicit path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Location of the identity file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored identity, generating and persisting missing values
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or if the
    /// identity cannot be written.
    pub fn load_or_create(&self) -> Result<Identity> {
        let stored = if self.path.exists() {
            let contents = std::fs::read_to_string(&self.path)
                .with_context(|| format!("Failed to read {}", self.path.display()))?;
            serde_json::from_str::<StoredIdentity>(&contents).map_err(|e| {
                FgoChatError::Identity(format!(
                    "Corrupt identity file {}: {}",
                    self.path.display(),
                    e
                ))
            })?
        } else {
            StoredIdentity::default()
        };

        let complete = stored.user_id.is_some() && stored.username.is_some();
        let identity = Identity {
            user_id: stored.user_id.unwrap_or_else(generate_user_id),
            username: stored.username.unwrap_or_else(generate_username),
        };

        if !complete {
            self.save(&identity)?;
            tracing::info!(user_id = %identity.user_id, "Generated local identity");
        }

        Ok(identity)
    }

    fn save(&self, identity: &Identity) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FgoChatError::Identity(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        let json = serde_json::to_string_pretty(identity)?;
        std::fs::write(&self.path, json)
            .map_err(|e| FgoChatError::Identity(format!("Failed to write identity: {}", e)))?;
        Ok(())
    }
}
