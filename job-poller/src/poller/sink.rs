//! Events emitted by a poller and the sinks that receive them.

use crate::job::{ItemStatus, JobStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::{broadcast, mpsc};

/// Status change of one item, as observed by the poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReport {
    pub job_id: String,
    pub item_id: String,
    pub status: ItemStatus,
    /// Status before this change. On a retry-budget timeout this tells
    /// whether the item had already been making progress.
    pub previous: Option<ItemStatus>,
    pub job_status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollEnd {
    Done,
    TimedOut,
    Cancelled,
}

/// Final state of a poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOutcome {
    pub job_id: String,
    pub version: u64,
    pub end: PollEnd,
    pub items: BTreeMap<String, ItemStatus>,
}

impl PollOutcome {
    /// Job finished and every tracked item is `done`.
    pub fn succeeded(&self) -> bool {
        self.end == PollEnd::Done && self.items.values().all(|s| *s == ItemStatus::Done)
    }

    pub fn count(&self, status: ItemStatus) -> usize {
        self.items.values().filter(|s| **s == status).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum JobEvent {
    #[serde(rename = "job:item")]
    Item(ItemReport),

    #[serde(rename = "job:finished")]
    Finished(PollOutcome),
}

/// Receiver of poller events. Called from the poller task only.
pub trait ItemSink: Send + Sync {
    fn send(&self, event: JobEvent);
}

impl ItemSink for mpsc::UnboundedSender<JobEvent> {
    fn send(&self, event: JobEvent) {
        // Receiver gone means nobody is watching any more
        let _ = mpsc::UnboundedSender::send(self, event);
    }
}

impl ItemSink for broadcast::Sender<JobEvent> {
    fn send(&self, event: JobEvent) {
        let _ = broadcast::Sender::send(self, event);
    }
}
