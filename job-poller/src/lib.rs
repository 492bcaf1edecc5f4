//! Lupapiste job poller library
//!
//! Client for the backend's asynchronous attachment jobs (stamping,
//! binding). Jobs are started with a command and then followed by polling
//! a status query until they finish or the retry budget runs out.

pub mod attachments;
pub mod config;
pub mod daemon;
pub mod job;
pub mod poller;
pub mod progress;
pub mod tracker;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use poller::{AsyncJobPoller, JobEvent, PollOutcome, PollPolicy};
pub use utils::errors::PollerError;
pub type Result<T> = std::result::Result<T, PollerError>;
