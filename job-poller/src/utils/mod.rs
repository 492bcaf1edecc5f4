//! Utility modules for the job poller.

pub mod errors;
pub mod logger;

pub use errors::{PollerError, Result};
