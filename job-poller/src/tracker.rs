//! Job tracking for running pollers.

use crate::job::JobHandle;
use crate::poller::{AsyncJobPoller, ItemSink, PollerHandle};
use crate::utils::errors::{PollerError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

struct Registration {
    /// Distinguishes re-registrations of the same job id
    generation: u64,
    cancel: CancellationToken,
}

/// Tracks running pollers and provides cancellation mechanism
#[derive(Clone)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<String, Registration>>>,
    next_generation: Arc<AtomicU64>,
    root: CancellationToken,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::with_root(CancellationToken::new())
    }

    /// Every tracked poller gets a child of `root`, so cancelling it stops all.
    pub fn with_root(root: CancellationToken) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(0)),
            root,
        }
    }

    /// Spawn a poller for `job` and track it until it finishes.
    pub async fn spawn(
        &self,
        poller: AsyncJobPoller,
        job: JobHandle,
        sink: Arc<dyn ItemSink>,
    ) -> Result<PollerHandle> {
        let cancel = self.root.child_token();
        let generation = self.register(job.id.clone(), cancel.clone()).await?;

        let poller = poller.with_cancel(cancel.clone());
        let tracker = self.clone();
        let job_id = job.id.clone();
        let join = tokio::spawn(async move {
            let outcome = poller.run(job, sink.as_ref()).await;
            tracker.release(&outcome.job_id, generation).await;
            outcome
        });

        Ok(PollerHandle::new(job_id, cancel, join))
    }

    /// Register a job with its cancellation token. Returns the generation
    /// of this registration.
    pub async fn register(&self, job_id: String, cancel: CancellationToken) -> Result<u64> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job_id) {
            return Err(PollerError::DuplicateJob(job_id));
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        jobs.insert(job_id, Registration { generation, cancel });
        Ok(generation)
    }

    /// Cancel a running poller by its job ID
    pub async fn cancel(&self, job_id: &str) -> bool {
        let mut jobs = self.jobs.write().await;
        if let Some(registration) = jobs.remove(job_id) {
            registration.cancel.cancel();
            true
        } else {
            false
        }
    }

    pub async fn cancel_all(&self) {
        self.root.cancel();
        self.jobs.write().await.clear();
    }

    /// Remove a job from tracking
    pub async fn complete(&self, job_id: &str) {
        let mut jobs = self.jobs.write().await;
        jobs.remove(job_id);
    }

    /// Remove a job only if it is still the given registration. A poller
    /// that ends after its id was registered again leaves the new one alone.
    async fn release(&self, job_id: &str, generation: u64) {
        let mut jobs = self.jobs.write().await;
        if jobs.get(job_id).is_some_and(|r| r.generation == generation) {
            jobs.remove(job_id);
        }
    }

    pub async fn is_tracked(&self, job_id: &str) -> bool {
        self.jobs.read().await.contains_key(job_id)
    }

    /// Get count of running pollers
    pub async fn running_count(&self) -> usize {
        let jobs = self.jobs.read().await;
        jobs.len()
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}
