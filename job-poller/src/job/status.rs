//! Status vocabulary shared by jobs and their items.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a single item (usually one file) inside a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Running,
    Working,
    Done,
    Error,
    /// Client-side only: the poller gave up waiting for this item.
    Timeout,
}

impl ItemStatus {
    /// True once the item will not change any more.
    pub fn is_finished(self) -> bool {
        !matches!(self, ItemStatus::Pending | ItemStatus::Running | ItemStatus::Working)
    }

    /// Merge ordering: pending < running = working < finished.
    fn rank(self) -> u8 {
        match self {
            ItemStatus::Pending => 0,
            ItemStatus::Running | ItemStatus::Working => 1,
            ItemStatus::Done | ItemStatus::Error | ItemStatus::Timeout => 2,
        }
    }

    /// Whether moving from `self` to `next` keeps the item moving forward.
    ///
    /// Finished statuses are frozen, so a replayed update can never turn a
    /// `done` item back into `running` (or into `error`).
    pub fn accepts(self, next: ItemStatus) -> bool {
        if self.is_finished() {
            return false;
        }
        next.rank() >= self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Running => "running",
            ItemStatus::Working => "working",
            ItemStatus::Done => "done",
            ItemStatus::Error => "error",
            ItemStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall status of a job as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    /// Client-side only, attached to item reports emitted when the retry
    /// budget runs out.
    Timeout,
    /// Anything else the backend may invent. Treated as still in progress.
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_done(self) -> bool {
        self == JobStatus::Done
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Timeout => "timeout",
            JobStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}
