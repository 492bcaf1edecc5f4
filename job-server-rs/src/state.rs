use crate::config::AppConfig;
use crate::services::job_registry::JobRegistry;
use tokio_util::sync::CancellationToken;

pub struct AppState {
    pub config: AppConfig,
    pub jobs: JobRegistry,
    /// Cancelled on shutdown; job workers stop with it
    pub cancel: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            jobs: JobRegistry::new(),
            cancel,
        }
    }
}
