use crate::models::job::{ItemStatus, JobKind};
use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Process a job in the background. Items are handled one at a time, each
/// going `running` then `done`, one configured step per change.
pub fn spawn_job_worker(state: Arc<AppState>, job_id: String) {
    tokio::spawn(async move {
        let step = state.config.job_step;
        let cancel = state.cancel.child_token();
        if run_job(&state, &job_id, step, &cancel).await {
            tracing::info!("Job {} done", job_id);
        } else {
            tracing::info!("Job {} abandoned", job_id);
        }
    });
}

async fn run_job(state: &AppState, job_id: &str, step: Duration, cancel: &CancellationToken) -> bool {
    let Some(kind) = state.jobs.kind(job_id) else {
        return false;
    };
    let count = state.jobs.item_count(job_id);

    for index in 0..count {
        if !pause(step, cancel).await {
            return false;
        }
        state.jobs.update_item(job_id, index, ItemStatus::Running, None);

        if !pause(step, cancel).await {
            return false;
        }
        // Stamping produces a new file version
        let file_id = match kind {
            JobKind::Stamp => Some(uuid::Uuid::new_v4().to_string()),
            JobKind::Bind => None,
        };
        let version = state.jobs.update_item(job_id, index, ItemStatus::Done, file_id);
        tracing::debug!("Job {} item {} done at version {:?}", job_id, index, version);
    }
    true
}

async fn pause(step: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(step) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::models::job::{Job, JobStatus};

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(AppConfig::default(), CancellationToken::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_stamp_job_runs_to_done() {
        let state = state();
        let job = state
            .jobs
            .create(Job::stamp(&["a".to_string(), "b".to_string()]));

        let finished = run_job(&state, &job.id, Duration::from_millis(10), &CancellationToken::new()).await;
        assert!(finished);

        let view = state
            .jobs
            .wait_for_update(&job.id, JobKind::Stamp, 0, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.status, JobStatus::Done);
        assert_eq!(view.version, 4);
        assert!(view.value.values().all(|i| i.status == ItemStatus::Done && i.file_id.is_some()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_abandons_job() {
        let state = state();
        let job = state.jobs.create(Job::bind(&["f1".to_string()]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(!run_job(&state, &job.id, Duration::from_millis(10), &cancel).await);
        let pending = state
            .jobs
            .wait_for_update(&job.id, JobKind::Bind, 0, Duration::ZERO)
            .await
            .unwrap();
        assert!(pending.is_none());
    }
}
