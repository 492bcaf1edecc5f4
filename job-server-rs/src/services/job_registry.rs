use crate::error::AppError;
use crate::models::job::{ItemStatus, Job, JobKind, JobView};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

struct JobEntry {
    job: Mutex<Job>,
    /// Carries the latest version; long-polling queries wait on it
    changed: watch::Sender<u64>,
}

impl JobEntry {
    fn lock(&self) -> MutexGuard<'_, Job> {
        // A poisoned lock only means a panic elsewhere; the job data is still usable
        self.job.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// In-memory store of running and recently finished jobs.
pub struct JobRegistry {
    jobs: DashMap<String, Arc<JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
        }
    }

    /// Store a new job and return its full view.
    pub fn create(&self, job: Job) -> JobView {
        let view = job.full_view();
        let (changed, _) = watch::channel(job.version);
        self.jobs.insert(
            job.id.clone(),
            Arc::new(JobEntry {
                job: Mutex::new(job),
                changed,
            }),
        );
        view
    }

    fn entry(&self, id: &str) -> Option<Arc<JobEntry>> {
        self.jobs.get(id).map(|e| e.value().clone())
    }

    pub fn kind(&self, id: &str) -> Option<JobKind> {
        let entry = self.entry(id)?;
        let kind = entry.lock().kind;
        Some(kind)
    }

    pub fn item_count(&self, id: &str) -> usize {
        let Some(entry) = self.entry(id) else {
            return 0;
        };
        let count = entry.lock().items.len();
        count
    }

    /// Change one item and wake up waiting queries.
    pub fn update_item(&self, id: &str, index: usize, status: ItemStatus, file_id: Option<String>) -> Option<u64> {
        let entry = self.entry(id)?;
        let version = {
            let mut job = entry.lock();
            if !job.set_item(index, status, file_id) {
                return None;
            }
            job.version
        };
        entry.changed.send_replace(version);
        Some(version)
    }

    /// Changes of job `id` after `version`, waiting up to `wait` for one to
    /// happen. `Ok(None)` means the wait expired without a change.
    pub async fn wait_for_update(
        &self,
        id: &str,
        kind: JobKind,
        version: u64,
        wait: Duration,
    ) -> Result<Option<JobView>, AppError> {
        let entry = self
            .entry(id)
            .filter(|e| e.lock().kind == kind)
            .ok_or_else(|| AppError::NotFound("error.job-not-found".into()))?;

        // Subscribe before looking so a change in between is not missed
        let mut rx = entry.changed.subscribe();
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let view = entry.lock().view_since(version);
            if view.is_some() {
                return Ok(view);
            }
            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => continue,
                _ => return Ok(None),
            }
        }
    }

    /// Drop finished jobs older than `retention`. Returns how many went.
    pub fn purge_finished(&self, retention: Duration) -> usize {
        let now = Utc::now();
        let before = self.jobs.len();
        self.jobs.retain(|_, entry| match entry.lock().finished_at {
            Some(finished) => (now - finished).to_std().unwrap_or_default() < retention,
            None => true,
        });
        before - self.jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_job() -> (Arc<JobRegistry>, String) {
        let registry = Arc::new(JobRegistry::new());
        let view = registry.create(Job::stamp(&["a".to_string(), "b".to_string()]));
        (registry, view.id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_immediately_when_behind() {
        let (registry, id) = registry_with_job();
        registry.update_item(&id, 0, ItemStatus::Running, None);

        let view = registry
            .wait_for_update(&id, JobKind::Stamp, 0, Duration::from_secs(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.version, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_expires_without_change() {
        let (registry, id) = registry_with_job();
        let started = tokio::time::Instant::now();

        let result = registry
            .wait_for_update(&id, JobKind::Stamp, 0, Duration::from_secs(7))
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(started.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_wakes_on_update() {
        let (registry, id) = registry_with_job();
        let updater = registry.clone();
        let job_id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            updater.update_item(&job_id, 1, ItemStatus::Done, Some("new-b".into()));
        });

        let started = tokio::time::Instant::now();
        let view = registry
            .wait_for_update(&id, JobKind::Stamp, 0, Duration::from_secs(10))
            .await
            .unwrap()
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(view.value.len(), 1);
        assert_eq!(view.value["b"].file_id.as_deref(), Some("new-b"));
    }

    #[tokio::test]
    async fn test_unknown_or_wrong_kind_is_not_found() {
        let (registry, id) = registry_with_job();
        let err = registry
            .wait_for_update("missing", JobKind::Stamp, 0, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = registry
            .wait_for_update(&id, JobKind::Bind, 0, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_purge_keeps_running_jobs() {
        let (registry, id) = registry_with_job();
        let done = registry.create(Job::stamp(&["x".to_string()]));
        registry.update_item(&done.id, 0, ItemStatus::Done, None);

        assert_eq!(registry.purge_finished(Duration::from_secs(3600)), 0);
        assert_eq!(registry.purge_finished(Duration::ZERO), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.kind(&id), Some(JobKind::Stamp));
    }
}
