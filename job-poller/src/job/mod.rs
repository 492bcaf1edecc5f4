//! Job model: handles, wire snapshots and the per-item status map.

pub mod items;
pub mod status;

pub use items::{ItemChange, ItemStatusMap};
pub use status::{ItemStatus, JobStatus};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Cursor into a backend job: the job id and the last version seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
    pub version: u64,
}

impl JobHandle {
    pub fn new(id: impl Into<String>, version: u64) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

/// Per-item payload inside a job's `value` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemValue {
    pub status: ItemStatus,
    /// Binding jobs identify the item by this field. Stamping jobs use it
    /// for the id of the freshly stamped file version.
    #[serde(rename = "fileId", default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

/// A job as returned by initiating commands and by poll queries.
///
/// Poll answers carry only the items that changed since the requested
/// version, so `value` is a delta, not the full item set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default = "default_job_status")]
    pub status: JobStatus,
    #[serde(default)]
    pub value: BTreeMap<String, ItemValue>,
}

fn default_job_status() -> JobStatus {
    JobStatus::Running
}

impl JobSnapshot {
    pub fn handle(&self) -> JobHandle {
        JobHandle::new(self.id.clone(), self.version)
    }
}

/// Outcome of a single poll request.
#[derive(Debug, Clone, PartialEq)]
pub enum PollResult {
    /// The job moved past the requested version.
    Update(JobSnapshot),
    /// Nothing usable came back: transport failure, client timeout, or the
    /// backend's long-poll expired without a new version.
    NoUpdate,
}

/// Raw body of a poll query response.
#[derive(Debug, Deserialize)]
pub struct PollResponse {
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub job: Option<JobSnapshot>,
}

impl From<PollResponse> for PollResult {
    fn from(response: PollResponse) -> Self {
        if response.ok == Some(false) {
            return PollResult::NoUpdate;
        }
        match (response.result.as_deref(), response.job) {
            (Some("update"), Some(job)) => PollResult::Update(job),
            _ => PollResult::NoUpdate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_response_decodes() {
        let body = json!({
            "ok": true,
            "result": "update",
            "job": {
                "id": "job-1",
                "version": 3,
                "status": "running",
                "value": {
                    "att-1": {"status": "done", "fileId": "file-9"},
                    "att-2": {"status": "working"}
                }
            }
        });
        let response: PollResponse = serde_json::from_value(body).unwrap();
        let PollResult::Update(job) = PollResult::from(response) else {
            panic!("expected update");
        };
        assert_eq!(job.handle(), JobHandle::new("job-1", 3));
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.value["att-1"].file_id.as_deref(), Some("file-9"));
        assert_eq!(job.value["att-2"].status, ItemStatus::Working);
    }

    #[test]
    fn test_timeout_response_is_no_update() {
        let response: PollResponse =
            serde_json::from_value(json!({"ok": true, "result": "timeout"})).unwrap();
        assert_eq!(PollResult::from(response), PollResult::NoUpdate);
    }

    #[test]
    fn test_update_without_job_is_no_update() {
        let response: PollResponse =
            serde_json::from_value(json!({"ok": true, "result": "update"})).unwrap();
        assert_eq!(PollResult::from(response), PollResult::NoUpdate);
    }

    #[test]
    fn test_rejected_query_is_no_update() {
        let response: PollResponse = serde_json::from_value(json!({
            "ok": false,
            "text": "error.unauthorized",
            "result": "update",
            "job": {"id": "job-1", "version": 1}
        }))
        .unwrap();
        assert_eq!(PollResult::from(response), PollResult::NoUpdate);
    }

    #[test]
    fn test_command_job_defaults() {
        // stamp-attachments answers with a bare job id
        let job: JobSnapshot = serde_json::from_value(json!({"id": "stamp-1"})).unwrap();
        assert_eq!(job.version, 0);
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.value.is_empty());
    }
}
