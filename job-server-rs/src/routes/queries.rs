use crate::error::AppError;
use crate::models::job::{JobKind, JobView};
use crate::state::AppState;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub fn router(_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/stamp-attachments-job", get(stamp_job_status))
        .route("/bind-attachments-job", get(bind_job_status))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQuery {
    pub job_id: String,
    #[serde(default)]
    pub version: u64,
    /// Milliseconds to hold the request open waiting for a change
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub ok: bool,
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<JobView>,
}

async fn stamp_job_status(
    State(state): State<Arc<AppState>>,
    query: Result<Query<JobQuery>, QueryRejection>,
) -> Result<Json<JobStatusResponse>, AppError> {
    let Query(query) = query?;
    job_status(&state, query, JobKind::Stamp).await
}

async fn bind_job_status(
    State(state): State<Arc<AppState>>,
    query: Result<Query<JobQuery>, QueryRejection>,
) -> Result<Json<JobStatusResponse>, AppError> {
    let Query(query) = query?;
    job_status(&state, query, JobKind::Bind).await
}

/// Long-poll: answer at once if the job moved past `version`, otherwise
/// hold the request until it does or the wait runs out.
async fn job_status(
    state: &AppState,
    query: JobQuery,
    kind: JobKind,
) -> Result<Json<JobStatusResponse>, AppError> {
    let max_wait = state.config.max_poll_wait;
    let wait = query
        .timeout
        .map(Duration::from_millis)
        .map_or(max_wait, |t| t.min(max_wait));

    let view = state
        .jobs
        .wait_for_update(&query.job_id, kind, query.version, wait)
        .await?;

    let response = match view {
        Some(job) => JobStatusResponse {
            ok: true,
            result: "update",
            job: Some(job),
        },
        None => JobStatusResponse {
            ok: true,
            result: "timeout",
            job: None,
        },
    };
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;

    async fn create_stamp_job(app: &axum::Router) -> String {
        let (_, body) = send(
            app,
            post("/api/command/stamp-attachments", json!({"id": "LP-1", "files": ["att-1"]})),
        )
        .await;
        body["job"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_waits_for_update() {
        let (_, app) = app();
        let job_id = create_stamp_job(&app).await;

        let uri = format!("/api/query/stamp-attachments-job?jobId={job_id}&version=0&timeout=1000");
        let (status, body) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], "update");
        assert_eq!(body["job"]["version"], 1);
        assert_eq!(body["job"]["value"]["att-1"]["status"], "running");
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_runs_to_done() {
        let (_, app) = app();
        let job_id = create_stamp_job(&app).await;

        let mut version = 0;
        let mut last = json!(null);
        for _ in 0..10 {
            let uri = format!("/api/query/stamp-attachments-job?jobId={job_id}&version={version}");
            let (_, body) = send(&app, get(&uri)).await;
            if body["result"] == "update" {
                version = body["job"]["version"].as_u64().unwrap();
                last = body["job"].clone();
                if last["status"] == "done" {
                    break;
                }
            }
        }
        assert_eq!(last["status"], "done");
        assert_eq!(last["value"]["att-1"]["status"], "done");
        assert!(last["value"]["att-1"]["fileId"].is_string());
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_times_out_without_change() {
        let (state, app) = app();
        let job_id = create_stamp_job(&app).await;
        state.cancel.cancel();

        let uri = format!("/api/query/stamp-attachments-job?jobId={job_id}&version=0&timeout=500");
        let (status, body) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true, "result": "timeout"}));
    }

    #[tokio::test]
    async fn test_malformed_query_is_lupapiste_error() {
        let (_, app) = app();
        let (status, body) = send(&app, get("/api/query/stamp-attachments-job?jobId=x&version=abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"ok": false, "text": "error.illegal-value"}));

        let (status, body) = send(&app, get("/api/query/bind-attachments-job?version=1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["text"], "error.illegal-value");
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let (_, app) = app();
        let job_id = create_stamp_job(&app).await;

        let (status, body) = send(&app, get("/api/query/stamp-attachments-job?jobId=nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"ok": false, "text": "error.job-not-found"}));

        // A stamp job is not visible through the bind query
        let uri = format!("/api/query/bind-attachments-job?jobId={job_id}&timeout=0");
        let (status, _) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
