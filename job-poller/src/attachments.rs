//! Attachment operations that run as backend jobs: stamping and binding.
//!
//! Each operation issues its initiating command once and, if the backend
//! accepts it, hands the returned job to a tracked poller. A rejected
//! command is returned to the caller and no poller is started.

use crate::job::{ItemStatus, ItemStatusMap, JobHandle, JobSnapshot};
use crate::poller::{AsyncJobPoller, ItemKey, ItemSink, PollPolicy, PollerHandle};
use crate::tracker::JobTracker;
use crate::transport::JobTransport;
use crate::utils::errors::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Stamp,
    Bind,
}

impl JobKind {
    pub fn command(self) -> &'static str {
        match self {
            JobKind::Stamp => "stamp-attachments",
            JobKind::Bind => "bind-attachments",
        }
    }

    pub fn query(self) -> &'static str {
        match self {
            JobKind::Stamp => "stamp-attachments-job",
            JobKind::Bind => "bind-attachments-job",
        }
    }

    fn item_key(self) -> ItemKey {
        match self {
            JobKind::Stamp => ItemKey::MapKey,
            JobKind::Bind => ItemKey::FileId,
        }
    }

    /// Status every item starts from before the first update arrives.
    fn initial_status(self) -> ItemStatus {
        match self {
            JobKind::Stamp => ItemStatus::Pending,
            JobKind::Bind => ItemStatus::Running,
        }
    }
}

/// Stamp the latest versions of the given attachments.
#[derive(Debug, Clone)]
pub struct StampRequest {
    pub application_id: String,
    pub lang: String,
    pub timestamp: DateTime<Utc>,
    /// Attachment ids
    pub files: Vec<String>,
    /// Stamp definition as configured by the organization. Passed through.
    pub stamp: serde_json::Value,
}

impl StampRequest {
    fn params(&self) -> serde_json::Value {
        json!({
            "id": self.application_id,
            "lang": self.lang,
            "timestamp": self.timestamp.timestamp_millis(),
            "files": self.files,
            "stamp": self.stamp,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentType {
    #[serde(rename = "type-group")]
    pub type_group: String,
    #[serde(rename = "type-id")]
    pub type_id: String,
}

/// One uploaded file to bind to an application attachment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub attachment_type: Option<AttachmentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drawing_number: Option<String>,
    #[serde(default)]
    pub sign: bool,
    #[serde(default)]
    pub construction_time: bool,
    #[serde(default)]
    pub disable_resell: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_id: Option<String>,
}

impl FileData {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct BindRequest {
    pub application_id: String,
    pub filedatas: Vec<FileData>,
    /// Needed only when at least one file is signed.
    pub password: Option<String>,
}

impl BindRequest {
    fn params(&self) -> serde_json::Value {
        let mut params = json!({
            "id": self.application_id,
            "filedatas": self.filedatas,
        });
        if self.filedatas.iter().any(|f| f.sign) {
            if let Some(password) = &self.password {
                params["password"] = json!(password);
            }
        }
        params
    }
}

pub struct AttachmentJobs {
    transport: Arc<dyn JobTransport>,
    policy: PollPolicy,
    tracker: JobTracker,
}

impl AttachmentJobs {
    pub fn new(transport: Arc<dyn JobTransport>, policy: PollPolicy, tracker: JobTracker) -> Self {
        Self {
            transport,
            policy,
            tracker,
        }
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    pub async fn stamp(&self, request: &StampRequest, sink: Arc<dyn ItemSink>) -> Result<PollerHandle> {
        let job = self
            .transport
            .submit(JobKind::Stamp.command(), request.params())
            .await?;
        info!(
            "Stamping {} attachments of {} as job {}",
            request.files.len(),
            request.application_id,
            job.id
        );
        let items = seed(JobKind::Stamp, request.files.iter().cloned());
        self.launch(JobKind::Stamp, job.handle(), items, sink).await
    }

    pub async fn bind(&self, request: &BindRequest, sink: Arc<dyn ItemSink>) -> Result<PollerHandle> {
        let job = self
            .transport
            .submit(JobKind::Bind.command(), request.params())
            .await?;
        info!(
            "Binding {} files to {} as job {}",
            request.filedatas.len(),
            request.application_id,
            job.id
        );
        let items = seed(JobKind::Bind, request.filedatas.iter().map(|f| f.file_id.clone()));
        self.launch(JobKind::Bind, job.handle(), items, sink).await
    }

    /// Bind a single file to an existing attachment.
    pub async fn bind_one(
        &self,
        application_id: &str,
        attachment_id: &str,
        file_id: &str,
        sink: Arc<dyn ItemSink>,
    ) -> Result<PollerHandle> {
        let params = json!({
            "id": application_id,
            "attachmentId": attachment_id,
            "fileId": file_id,
        });
        let job = self.transport.submit("bind-attachment", params).await?;
        info!("Binding file {} to attachment {} as job {}", file_id, attachment_id, job.id);
        let items = seed(JobKind::Bind, [file_id.to_string()]);
        self.launch(JobKind::Bind, job.handle(), items, sink).await
    }

    /// Follow a job the backend announced on its own, e.g. a bind job that
    /// was started during upload. Items are taken from the job itself.
    pub async fn resume(&self, kind: JobKind, job: &JobSnapshot, sink: Arc<dyn ItemSink>) -> Result<PollerHandle> {
        let items = ItemStatusMap::tracking(job.value.iter().filter_map(|(key, value)| {
            let id = match kind {
                JobKind::Stamp => Some(key.clone()),
                JobKind::Bind => value.file_id.clone(),
            };
            id.map(|id| (id, value.status))
        }));
        self.launch(kind, job.handle(), items, sink).await
    }

    /// Follow an arbitrary job by id, adopting whatever items it reports.
    pub async fn watch(&self, kind: JobKind, job: JobHandle, sink: Arc<dyn ItemSink>) -> Result<PollerHandle> {
        self.launch(kind, job, ItemStatusMap::adopting(), sink).await
    }

    async fn launch(
        &self,
        kind: JobKind,
        job: JobHandle,
        items: ItemStatusMap,
        sink: Arc<dyn ItemSink>,
    ) -> Result<PollerHandle> {
        let poller = AsyncJobPoller::new(self.transport.clone(), kind.query(), self.policy.clone())
            .with_item_key(kind.item_key())
            .with_items(items);
        self.tracker.spawn(poller, job, sink).await
    }
}

fn seed(kind: JobKind, ids: impl IntoIterator<Item = String>) -> ItemStatusMap {
    let status = kind.initial_status();
    ItemStatusMap::tracking(ids.into_iter().map(|id| (id, status)))
}
