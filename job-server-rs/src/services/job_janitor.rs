use crate::state::AppState;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Periodically forget finished jobs past their retention.
pub fn start_job_janitor(state: Arc<AppState>, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let purged = state.jobs.purge_finished(state.config.job_retention);
                    if purged > 0 {
                        tracing::info!("Purged {} finished jobs, {} remain", purged, state.jobs.len());
                    }
                }
            }
        }
        tracing::info!("Job janitor stopped");
    });
}
