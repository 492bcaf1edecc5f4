use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl ItemStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, ItemStatus::Done | ItemStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Stamp,
    Bind,
}

// ── Job ──

#[derive(Debug, Clone)]
pub struct JobItem {
    /// Key in the job's `value` map
    pub key: String,
    pub status: ItemStatus,
    pub file_id: Option<String>,
    /// Job version at which this item last changed
    pub changed_at: u64,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub version: u64,
    pub status: JobStatus,
    pub items: Vec<JobItem>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemView {
    pub status: ItemStatus,
    #[serde(rename = "fileId", skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

/// Job as sent over the wire: the items changed after some version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView {
    pub id: String,
    pub version: u64,
    pub status: JobStatus,
    pub value: BTreeMap<String, ItemView>,
}

impl Job {
    /// Stamping: one item per attachment id, keyed by it.
    pub fn stamp(attachment_ids: &[String]) -> Self {
        let items = attachment_ids
            .iter()
            .map(|id| JobItem {
                key: id.clone(),
                status: ItemStatus::Pending,
                file_id: None,
                changed_at: 0,
            })
            .collect();
        Self::new(JobKind::Stamp, items)
    }

    /// Binding: one item per uploaded file, keyed by position, with the
    /// file id in the item payload.
    pub fn bind(file_ids: &[String]) -> Self {
        let items = file_ids
            .iter()
            .enumerate()
            .map(|(i, file_id)| JobItem {
                key: i.to_string(),
                status: ItemStatus::Pending,
                file_id: Some(file_id.clone()),
                changed_at: 0,
            })
            .collect();
        Self::new(JobKind::Bind, items)
    }

    fn new(kind: JobKind, items: Vec<JobItem>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            version: 0,
            status: JobStatus::Running,
            items,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Set one item's status and bump the version. The job turns `done`
    /// in the same version as its last item finishes.
    pub fn set_item(&mut self, index: usize, status: ItemStatus, file_id: Option<String>) -> bool {
        let next = self.version + 1;
        let Some(item) = self.items.get_mut(index) else {
            return false;
        };
        item.status = status;
        if file_id.is_some() {
            item.file_id = file_id;
        }
        item.changed_at = next;
        self.version = next;

        if self.items.iter().all(|i| i.status.is_finished()) {
            self.status = JobStatus::Done;
            self.finished_at = Some(Utc::now());
        }
        true
    }

    /// Items changed after `version`, or `None` if nothing did.
    pub fn view_since(&self, version: u64) -> Option<JobView> {
        if self.version <= version {
            return None;
        }
        Some(self.view(|item| item.changed_at > version))
    }

    pub fn full_view(&self) -> JobView {
        self.view(|_| true)
    }

    fn view(&self, include: impl Fn(&JobItem) -> bool) -> JobView {
        JobView {
            id: self.id.clone(),
            version: self.version,
            status: self.status,
            value: self
                .items
                .iter()
                .filter(|item| include(item))
                .map(|item| {
                    (
                        item.key.clone(),
                        ItemView {
                            status: item.status,
                            file_id: item.file_id.clone(),
                        },
                    )
                })
                .collect(),
        }
    }
}
