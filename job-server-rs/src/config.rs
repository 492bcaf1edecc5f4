use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub log_level: String,
    /// Simulated processing time of one item state change
    pub job_step: Duration,
    /// Upper bound for how long a status query is held open
    pub max_poll_wait: Duration,
    /// Finished jobs are forgotten after this long
    pub job_retention: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            port: env_or("PORT", 8000),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            job_step: Duration::from_millis(env_or("JOB_STEP_MS", 500)),
            max_poll_wait: Duration::from_millis(env_or("MAX_POLL_WAIT_MS", 10_000)),
            job_retention: Duration::from_secs(env_or("JOB_RETENTION_SECS", 3_600)),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            log_level: "info".into(),
            job_step: Duration::from_millis(500),
            max_poll_wait: Duration::from_millis(10_000),
            job_retention: Duration::from_secs(3_600),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
