//! Backend access for job commands and job status queries.

pub mod http;

pub use http::HttpTransport;

use crate::job::{JobHandle, JobSnapshot, PollResult};
use crate::utils::errors::Result;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait JobTransport: Send + Sync {
    /// Issue the command that creates a job. Not retried.
    async fn submit(&self, command: &str, params: serde_json::Value) -> Result<JobSnapshot>;

    /// Ask for changes past `job.version`. The backend may hold the request
    /// for up to `wait`. Failures of any kind come back as `NoUpdate`.
    async fn poll(&self, query: &str, job: &JobHandle, wait: Duration) -> PollResult;
}
