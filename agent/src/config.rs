//! Configuration management for the agent.

use crate::orchestrator::SyncSettings;
use clubsync_engine::ConflictResolution;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Local API host address
    pub host: String,
    /// Local API port
    pub port: u16,
    /// File the local store is persisted to
    pub data_path: PathBuf,
    /// Remote document endpoint, `None` runs offline
    pub sync_endpoint: Option<String>,
    /// Shared secret sent to the remote endpoint
    pub sync_token: String,
    pub push_debounce: Duration,
    pub pull_interval: Duration,
    pub request_timeout: Duration,
    /// Which side wins when a merge finds both sides edited the same entry
    pub conflict_resolution: ConflictResolution,
    /// Bearer token required by the local API, if set
    pub api_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = var("HOST").unwrap_or_else(|| "127.0.0.1".to_string());

        let port = var("PORT")
            .unwrap_or_else(|| "3710".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let data_path = var("DATA_PATH")
            .unwrap_or_else(|| "clubsync-data.json".to_string())
            .into();

        let millis = |name: &'static str, default: u64| -> Result<Duration, ConfigError> {
            match var(name) {
                None => Ok(Duration::from_millis(default)),
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
                    _ => Err(ConfigError::InvalidDuration(name)),
                },
            }
        };

        let conflict_resolution = match var("CONFLICT_RESOLUTION").as_deref() {
            None | Some("local-wins") => ConflictResolution::LocalWins,
            Some("remote-wins") => ConflictResolution::RemoteWins,
            Some(other) => return Err(ConfigError::InvalidConflictResolution(other.to_string())),
        };

        Ok(Self {
            host,
            port,
            data_path,
            sync_endpoint: var("SYNC_ENDPOINT"),
            sync_token: var("SYNC_TOKEN").unwrap_or_default(),
            push_debounce: millis("PUSH_DEBOUNCE_MS", 900)?,
            pull_interval: millis("PULL_INTERVAL_MS", 8000)?,
            request_timeout: millis("REQUEST_TIMEOUT_MS", 5000)?,
            conflict_resolution,
            api_token: var("API_TOKEN"),
        })
    }

    /// Orchestrator timing and merge settings.
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            push_debounce: self.push_debounce,
            pull_interval: self.pull_interval,
            request_timeout: self.request_timeout,
            conflict_resolution: self.conflict_resolution,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("{0} must be a positive number of milliseconds")]
    InvalidDuration(&'static str),

    #[error("Invalid CONFLICT_RESOLUTION {0:?}, expected local-wins or remote-wins")]
    InvalidConflictResolution(String),
}
