//! Configuration management for the job poller.
//!
//! Loads configuration from a TOML file. Command line flags override it.

use crate::poller::PollPolicy;
use crate::utils::errors::{PollerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Backend base URL, e.g. `https://www.lupapiste.fi`
    pub url: String,

    /// Optional bearer token
    #[serde(default)]
    pub token: Option<String>,

    /// Upper bound for an initiating command request
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Retry schedule. Each entry is also the long-poll wait sent to the
    /// backend for the poll that consumes it.
    #[serde(default = "default_retry_delays_ms")]
    pub retry_delays_ms: Vec<u64>,

    /// Pause before re-polling after a failed poll
    #[serde(default = "default_retry_pause_ms")]
    pub retry_pause_ms: u64,

    /// Extra client-side allowance on top of the long-poll wait
    #[serde(default = "default_request_grace_ms")]
    pub request_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_retry_delays_ms() -> Vec<u64> {
    // 8 x 7s + 2 x 10s = 76s
    let mut delays = vec![7_000; 8];
    delays.extend([10_000, 10_000]);
    delays
}

fn default_command_timeout_ms() -> u64 {
    30_000
}

fn default_retry_pause_ms() -> u64 {
    1_000
}

fn default_request_grace_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            retry_delays_ms: default_retry_delays_ms(),
            retry_pause_ms: default_retry_pause_ms(),
            request_grace_ms: default_request_grace_ms(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                url: "http://localhost:8000".to_string(),
                token: None,
                command_timeout_ms: default_command_timeout_ms(),
            },
            poll: PollConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| PollerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.url.trim().is_empty() {
            return Err(PollerError::Config("server.url must not be empty".into()));
        }
        if self.server.command_timeout_ms == 0 {
            return Err(PollerError::Config(
                "server.command_timeout_ms must be positive".into(),
            ));
        }
        if self.poll.retry_delays_ms.iter().any(|&d| d == 0) {
            return Err(PollerError::Config(
                "poll.retry_delays_ms entries must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.server.command_timeout_ms)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            retry_delays: self
                .poll
                .retry_delays_ms
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
            retry_pause: Duration::from_millis(self.poll.retry_pause_ms),
            request_grace: Duration::from_millis(self.poll.request_grace_ms),
        }
    }
}
