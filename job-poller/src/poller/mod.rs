//! Polling loop for asynchronous backend jobs.
//!
//! A poller follows exactly one job. It keeps a single request in flight,
//! always asks for changes past the highest version seen so far, and merges
//! each delta into its local item-status map. The loop ends when:
//! - the job reports `done` (items still in progress are forced to `timeout`)
//! - the retry schedule runs out after consecutive failed polls (items
//!   still in progress are forced to `timeout`)
//! - the cancellation token fires

pub mod policy;
pub mod sink;

pub use policy::PollPolicy;
pub use sink::{ItemReport, ItemSink, JobEvent, PollEnd, PollOutcome};

use crate::job::{ItemChange, ItemStatusMap, ItemValue, JobHandle, JobSnapshot, JobStatus, PollResult};
use crate::transport::JobTransport;
use crate::utils::errors::Result;
use policy::RetryBudget;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How an entry of a job's `value` map names its item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKey {
    /// The map key is the item id (stamping: attachment id).
    MapKey,
    /// The entry's `fileId` is the item id (binding).
    FileId,
}

impl ItemKey {
    fn resolve(self, key: &str, value: &ItemValue) -> Option<String> {
        match self {
            ItemKey::MapKey => Some(key.to_string()),
            ItemKey::FileId => value.file_id.clone(),
        }
    }

    /// File id worth reporting alongside the change, if any.
    fn reported_file_id(self, value: &ItemValue) -> Option<String> {
        match self {
            ItemKey::MapKey => value.file_id.clone(),
            ItemKey::FileId => None,
        }
    }
}

pub struct AsyncJobPoller {
    transport: Arc<dyn JobTransport>,
    query: String,
    item_key: ItemKey,
    policy: PollPolicy,
    items: ItemStatusMap,
    cancel: CancellationToken,
}

impl AsyncJobPoller {
    /// Poller for the given status query, adopting items as they appear.
    pub fn new(transport: Arc<dyn JobTransport>, query: impl Into<String>, policy: PollPolicy) -> Self {
        Self {
            transport,
            query: query.into(),
            item_key: ItemKey::MapKey,
            policy,
            items: ItemStatusMap::adopting(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_items(mut self, items: ItemStatusMap) -> Self {
        self.items = items;
        self
    }

    pub fn with_item_key(mut self, item_key: ItemKey) -> Self {
        self.item_key = item_key;
        self
    }

    /// Use an externally owned token, e.g. a child of a shutdown token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn the polling loop and return immediately.
    pub fn start(self, job: JobHandle, sink: Arc<dyn ItemSink>) -> PollerHandle {
        let cancel = self.cancel.clone();
        let job_id = job.id.clone();
        let join = tokio::spawn(async move { self.run(job, sink.as_ref()).await });
        PollerHandle::new(job_id, cancel, join)
    }

    /// Run the polling loop to completion on the current task.
    pub async fn run(mut self, job: JobHandle, sink: &dyn ItemSink) -> PollOutcome {
        let mut cursor = job;
        let mut budget = RetryBudget::new(&self.policy.retry_delays);
        let mut wait = self.policy.initial_wait();

        info!(
            "Polling job {} via {} ({} items, retry budget {:?})",
            cursor,
            self.query,
            self.items.len(),
            self.policy.total_budget()
        );

        loop {
            if self.cancel.is_cancelled() {
                return self.finish(cursor, PollEnd::Cancelled, sink);
            }

            debug!("Poll {} wait={}ms", cursor, wait.as_millis());
            let result = tokio::select! {
                _ = self.cancel.cancelled() => None,
                result = self.transport.poll(&self.query, &cursor, wait) => Some(result),
            };
            let Some(result) = result else {
                return self.finish(cursor, PollEnd::Cancelled, sink);
            };

            match result {
                PollResult::Update(job) => {
                    let status = job.status;
                    self.apply_update(&mut cursor, job, sink);

                    if status.is_done() {
                        let forced = self.items.time_out_in_progress();
                        if !forced.is_empty() {
                            warn!(
                                "Job {} done with {} items still in progress",
                                cursor.id,
                                forced.len()
                            );
                        }
                        self.report_all(&cursor.id, forced, JobStatus::Done, sink);
                        return self.finish(cursor, PollEnd::Done, sink);
                    }

                    budget.reset();
                    wait = self.policy.initial_wait();
                }
                PollResult::NoUpdate => match budget.take() {
                    Some(next_wait) => {
                        debug!(
                            "No update for job {}, retrying ({} retries left)",
                            cursor,
                            budget.remaining()
                        );
                        let paused = tokio::select! {
                            _ = self.cancel.cancelled() => false,
                            _ = tokio::time::sleep(self.policy.retry_pause) => true,
                        };
                        if !paused {
                            return self.finish(cursor, PollEnd::Cancelled, sink);
                        }
                        wait = next_wait;
                    }
                    None => {
                        let item_ids: Vec<&str> = self.items.iter().map(|(id, _)| id).collect();
                        warn!(
                            "Timeout from {}, job {}, items: {}",
                            self.query,
                            cursor.id,
                            item_ids.join(",")
                        );
                        let forced = self.items.time_out_in_progress();
                        self.report_all(&cursor.id, forced, JobStatus::Timeout, sink);
                        return self.finish(cursor, PollEnd::TimedOut, sink);
                    }
                },
            }
        }
    }

    fn apply_update(&mut self, cursor: &mut JobHandle, job: JobSnapshot, sink: &dyn ItemSink) {
        if job.version >= cursor.version {
            cursor.version = job.version;
        } else {
            debug!(
                "Stale version {} for job {} (have {})",
                job.version, cursor.id, cursor.version
            );
        }

        for (key, value) in &job.value {
            let Some(item_id) = self.item_key.resolve(key, value) else {
                debug!("Job {} entry {} has no item id", cursor.id, key);
                continue;
            };
            let file_id = self.item_key.reported_file_id(value);
            if let Some(change) = self.items.merge(&item_id, value.status, file_id) {
                sink.send(JobEvent::Item(report(&cursor.id, change, job.status)));
            }
        }
    }

    fn report_all(
        &self,
        job_id: &str,
        changes: Vec<ItemChange>,
        job_status: JobStatus,
        sink: &dyn ItemSink,
    ) {
        for change in changes {
            sink.send(JobEvent::Item(report(job_id, change, job_status)));
        }
    }

    fn finish(&self, cursor: JobHandle, end: PollEnd, sink: &dyn ItemSink) -> PollOutcome {
        let outcome = PollOutcome {
            job_id: cursor.id,
            version: cursor.version,
            end,
            items: self.items.snapshot(),
        };
        info!(
            "Job {} finished polling: {:?} at version {}",
            outcome.job_id, end, outcome.version
        );
        sink.send(JobEvent::Finished(outcome.clone()));
        outcome
    }
}

fn report(job_id: &str, change: ItemChange, job_status: JobStatus) -> ItemReport {
    ItemReport {
        job_id: job_id.to_string(),
        item_id: change.item_id,
        status: change.status,
        previous: change.previous,
        job_status,
        file_id: change.file_id,
    }
}

/// Handle to a spawned poller.
#[derive(Debug)]
pub struct PollerHandle {
    job_id: String,
    cancel: CancellationToken,
    join: JoinHandle<PollOutcome>,
}

impl PollerHandle {
    pub(crate) fn new(job_id: String, cancel: CancellationToken, join: JoinHandle<PollOutcome>) -> Self {
        Self { job_id, cancel, join }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the final outcome.
    pub async fn outcome(self) -> Result<PollOutcome> {
        Ok(self.join.await?)
    }
}
