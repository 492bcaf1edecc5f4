//! Error types for the job poller.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PollerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend answered `ok: false`. Carries the backend's error key.
    #[error("Command {command} rejected: {text}")]
    CommandRejected { command: String, text: String },

    #[error("Malformed job response: {0}")]
    MalformedResponse(String),

    #[error("Poller task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Job already tracked: {0}")]
    DuplicateJob(String),
}

pub type Result<T> = std::result::Result<T, PollerError>;
