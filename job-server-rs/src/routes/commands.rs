use crate::error::AppError;
use crate::models::job::{Job, JobView};
use crate::services::job_worker::spawn_job_worker;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn router(_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/stamp-attachments", post(stamp_attachments))
        .route("/bind-attachments", post(bind_attachments))
        .route("/bind-attachment", post(bind_attachment))
}

#[derive(Debug, Deserialize)]
pub struct StampAttachmentsRequest {
    pub id: String,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    pub files: Vec<String>,
    #[serde(default)]
    pub stamp: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindFileData {
    pub file_id: String,
    #[serde(default)]
    pub sign: bool,
}

#[derive(Debug, Deserialize)]
pub struct BindAttachmentsRequest {
    pub id: String,
    pub filedatas: Vec<BindFileData>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindAttachmentRequest {
    pub id: String,
    pub attachment_id: String,
    pub file_id: String,
}

#[derive(Debug, Serialize)]
pub struct JobCreated {
    pub ok: bool,
    pub job: JobView,
}

async fn stamp_attachments(
    State(state): State<Arc<AppState>>,
    body: Result<Json<StampAttachmentsRequest>, JsonRejection>,
) -> Result<Json<JobCreated>, AppError> {
    let Json(body) = body?;
    if body.files.is_empty() {
        return Err(AppError::BadRequest("error.no-files".into()));
    }
    tracing::info!(
        "Stamping {} attachments of {} (lang {})",
        body.files.len(),
        body.id,
        body.lang.as_deref().unwrap_or("fi")
    );
    Ok(Json(start(&state, Job::stamp(&body.files))))
}

async fn bind_attachments(
    State(state): State<Arc<AppState>>,
    body: Result<Json<BindAttachmentsRequest>, JsonRejection>,
) -> Result<Json<JobCreated>, AppError> {
    let Json(body) = body?;
    if body.filedatas.is_empty() {
        return Err(AppError::BadRequest("error.no-files".into()));
    }
    if body.filedatas.iter().any(|f| f.sign) && body.password.as_deref().unwrap_or("").is_empty() {
        return Err(AppError::BadRequest("error.password".into()));
    }
    let file_ids: Vec<String> = body.filedatas.into_iter().map(|f| f.file_id).collect();
    tracing::info!("Binding {} files to {}", file_ids.len(), body.id);
    Ok(Json(start(&state, Job::bind(&file_ids))))
}

async fn bind_attachment(
    State(state): State<Arc<AppState>>,
    body: Result<Json<BindAttachmentRequest>, JsonRejection>,
) -> Result<Json<JobCreated>, AppError> {
    let Json(body) = body?;
    tracing::info!(
        "Binding file {} to attachment {} of {}",
        body.file_id,
        body.attachment_id,
        body.id
    );
    Ok(Json(start(&state, Job::bind(&[body.file_id]))))
}

fn start(state: &Arc<AppState>, job: Job) -> JobCreated {
    let view = state.jobs.create(job);
    spawn_job_worker(state.clone(), view.id.clone());
    JobCreated { ok: true, job: view }
}
