//! HTTP/JSON transport against the Lupapiste command/query API.
//!
//! Commands are `POST {base}/api/command/{name}` with a JSON body, queries
//! are `GET {base}/api/query/{name}` with query-string parameters. Both
//! answer with an `ok` flag and, on rejection, a `text` error key.

use super::JobTransport;
use crate::job::{JobHandle, JobSnapshot, PollResponse, PollResult};
use crate::utils::errors::{PollerError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    job: Option<JobSnapshot>,
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    request_grace: Duration,
    command_timeout: Duration,
}

/// Used until `with_command_timeout` says otherwise
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

impl HttpTransport {
    pub fn new(base_url: &str, token: Option<String>, request_grace: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("lupapiste-job-poller/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            request_grace,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        })
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    fn command_url(&self, command: &str) -> String {
        format!("{}/api/command/{}", self.base_url, command)
    }

    fn query_url(&self, query: &str) -> String {
        format!("{}/api/query/{}", self.base_url, query)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn try_poll(&self, query: &str, job: &JobHandle, wait: Duration) -> Result<PollResult> {
        let wait_ms = wait.as_millis().to_string();
        let version = job.version.to_string();
        let request = self
            .client
            .get(self.query_url(query))
            .query(&[
                ("jobId", job.id.as_str()),
                ("version", version.as_str()),
                ("timeout", wait_ms.as_str()),
            ])
            .timeout(wait + self.request_grace);

        let response = self.authorize(request).send().await?.error_for_status()?;
        let body: PollResponse = response.json().await?;
        Ok(body.into())
    }
}

#[async_trait]
impl JobTransport for HttpTransport {
    async fn submit(&self, command: &str, params: serde_json::Value) -> Result<JobSnapshot> {
        debug!("POST command {}", command);
        let request = self
            .client
            .post(self.command_url(command))
            .json(&params)
            .timeout(self.command_timeout);
        let response = self.authorize(request).send().await?;
        let status = response.status();

        let bytes = response.bytes().await?;
        let body: CommandResponse = match serde_json::from_slice(&bytes) {
            Ok(body) => body,
            // A failing status without a Lupapiste body is still a rejection
            Err(_) if !status.is_success() => {
                return Err(PollerError::CommandRejected {
                    command: command.to_string(),
                    text: format!("HTTP {}", status),
                });
            }
            Err(e) => return Err(e.into()),
        };
        if !body.ok {
            return Err(PollerError::CommandRejected {
                command: command.to_string(),
                text: body.text.unwrap_or_else(|| format!("HTTP {}", status)),
            });
        }
        body.job.ok_or_else(|| {
            PollerError::MalformedResponse(format!("{} response has no job", command))
        })
    }

    async fn poll(&self, query: &str, job: &JobHandle, wait: Duration) -> PollResult {
        match self.try_poll(query, job, wait).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Poll {} for job {} failed: {}", query, job, e);
                PollResult::NoUpdate
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ItemStatus, JobStatus};
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn stamp_command(Json(body): Json<Value>) -> Json<Value> {
        if body["files"].as_array().map_or(true, |f| f.is_empty()) {
            return Json(json!({"ok": false, "text": "error.no-files"}));
        }
        Json(json!({"ok": true, "job": {"id": "stamp-1"}}))
    }

    async fn stamp_job(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        // Echo the cursor back so the test can see what was sent
        let version: u64 = params["version"].parse().unwrap();
        Json(json!({
            "ok": true,
            "result": "update",
            "job": {
                "id": params["jobId"],
                "version": version + 1,
                "status": "done",
                "value": {"att-1": {"status": "done", "fileId": params["timeout"]}}
            }
        }))
    }

    async fn serve() -> String {
        let app = Router::new()
            .route("/api/command/stamp-attachments", post(stamp_command))
            .route(
                "/api/command/bind-attachments",
                post(|| async { (StatusCode::UNPROCESSABLE_ENTITY, "Failed to deserialize") }),
            )
            .route(
                "/api/command/bind-attachment",
                post(|| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Json(json!({"ok": true, "job": {"id": "late"}}))
                }),
            )
            .route("/api/query/stamp-attachments-job", get(stamp_job))
            .route(
                "/api/query/bind-attachments-job",
                get(|| async { Json(json!({"ok": true, "result": "timeout"})) }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::new(base, Some("token".into()), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_submit_returns_job() {
        let base = serve().await;
        let job = transport(&base)
            .submit("stamp-attachments", json!({"id": "LP-1", "files": ["att-1"]}))
            .await
            .unwrap();
        assert_eq!(job.id, "stamp-1");
        assert_eq!(job.version, 0);
    }

    #[tokio::test]
    async fn test_submit_rejection_carries_error_key() {
        let base = serve().await;
        let err = transport(&base)
            .submit("stamp-attachments", json!({"id": "LP-1", "files": []}))
            .await
            .unwrap_err();
        match err {
            PollerError::CommandRejected { command, text } => {
                assert_eq!(command, "stamp-attachments");
                assert_eq!(text, "error.no-files");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_submit_plain_error_status_is_rejection() {
        let base = serve().await;
        let err = transport(&base)
            .submit("bind-attachments", json!({"id": 1}))
            .await
            .unwrap_err();
        match err {
            PollerError::CommandRejected { text, .. } => assert!(text.contains("422")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_submit_gives_up_on_stalled_backend() {
        let base = serve().await;
        let started = std::time::Instant::now();
        let err = transport(&base)
            .with_command_timeout(Duration::from_millis(200))
            .submit("bind-attachment", json!({"id": "LP-1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, PollerError::Http(ref e) if e.is_timeout()));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_poll_sends_cursor_and_wait() {
        let base = serve().await;
        let result = transport(&base)
            .poll(
                "stamp-attachments-job",
                &JobHandle::new("stamp-1", 4),
                Duration::from_millis(7_000),
            )
            .await;
        let PollResult::Update(job) = result else {
            panic!("expected update");
        };
        assert_eq!(job.version, 5);
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.value["att-1"].status, ItemStatus::Done);
        assert_eq!(job.value["att-1"].file_id.as_deref(), Some("7000"));
    }

    #[tokio::test]
    async fn test_poll_timeout_result_is_no_update() {
        let base = serve().await;
        let result = transport(&base)
            .poll("bind-attachments-job", &JobHandle::new("b", 1), Duration::from_millis(10))
            .await;
        assert_eq!(result, PollResult::NoUpdate);
    }

    #[tokio::test]
    async fn test_poll_unknown_route_is_no_update() {
        let base = serve().await;
        let result = transport(&base)
            .poll("no-such-job", &JobHandle::new("b", 1), Duration::from_millis(10))
            .await;
        assert_eq!(result, PollResult::NoUpdate);
    }

    #[tokio::test]
    async fn test_poll_unreachable_backend_is_no_update() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = transport(&format!("http://{}", addr))
            .poll("bind-attachments-job", &JobHandle::new("b", 1), Duration::from_millis(10))
            .await;
        assert_eq!(result, PollResult::NoUpdate);
    }
}
