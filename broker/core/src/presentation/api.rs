// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP API over [`FederationApp`].
//!
//! Every response uses the [`ApiResponse`] envelope: `code` is `0` on
//! success and `1` on failure, `message` carries the error chain.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::application::federation_app::{
    DataAssociationItem, FederationApp, JobDetail, ProjectInvitationRequest, RequestError, SiteRegistrationRequest,
};
use crate::domain::federation::JobApprovalMessage;
use crate::domain::job::Job;
use crate::domain::project::{Project, ProjectData, ProjectParticipant};
use crate::domain::site::Site;

pub struct AppState {
    pub app: Arc<FederationApp>,
}

pub fn app(federation: Arc<FederationApp>) -> Router {
    let state = Arc::new(AppState { app: federation });

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/site", get(list_sites).post(register_site))
        .route("/api/v1/site/{uuid}", get(get_site).delete(unregister_site))
        .route("/api/v1/project", get(list_projects))
        .route("/api/v1/project/invitation", post(process_invitation))
        .route("/api/v1/project/invitation/{uuid}/accept", post(accept_invitation))
        .route("/api/v1/project/invitation/{uuid}/reject", post(reject_invitation))
        .route("/api/v1/project/invitation/{uuid}/revoke", post(revoke_invitation))
        .route("/api/v1/project/{uuid}/participant", get(list_participants))
        .route("/api/v1/project/{uuid}/participant/{site_uuid}/leave", post(participant_leave))
        .route("/api/v1/project/{uuid}/participant/{site_uuid}/dismiss", post(participant_dismiss))
        .route("/api/v1/project/{uuid}/data", get(list_data))
        .route("/api/v1/project/{uuid}/data/associate", post(associate_data))
        .route("/api/v1/project/{uuid}/data/{data_uuid}/dismiss", post(dismiss_data))
        .route("/api/v1/project/{uuid}/close", post(close_project))
        .route("/api/v1/project/{uuid}/job", get(list_project_jobs))
        .route("/api/v1/job/create", post(create_job))
        .route("/api/v1/job/{uuid}", get(get_job))
        .route("/api/v1/job/{uuid}/response", post(job_approval_response))
        .route("/api/v1/job/{uuid}/status", post(job_status_update))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Json<Self> {
        Json(Self {
            code: 0,
            message: "success".to_string(),
            data: Some(data),
        })
    }
}

fn done() -> Json<ApiResponse<()>> {
    Json(ApiResponse {
        code: 0,
        message: "success".to_string(),
        data: None,
    })
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let status = if err.downcast_ref::<RequestError>().is_some() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: format!("{:#}", err),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            code: 1,
            message: self.message,
            data: None,
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Sites
// ---------------------------------------------------------------------------

async fn register_site(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SiteRegistrationRequest>, JsonRejection>,
) -> ApiResult<Site> {
    let Json(request) = payload?;
    Ok(ApiResponse::success(state.app.register_site(request).await?))
}

async fn list_sites(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Site>> {
    Ok(ApiResponse::success(state.app.list_sites().await?))
}

async fn get_site(State(state): State<Arc<AppState>>, Path(uuid): Path<Uuid>) -> ApiResult<Site> {
    Ok(ApiResponse::success(state.app.get_site(uuid).await?))
}

async fn unregister_site(State(state): State<Arc<AppState>>, Path(uuid): Path<Uuid>) -> ApiResult<()> {
    state.app.unregister_site(uuid).await?;
    Ok(done())
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProjectListQuery {
    participant: Option<Uuid>,
}

async fn list_projects(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProjectListQuery>,
) -> ApiResult<Vec<Project>> {
    let projects = match query.participant {
        Some(site_uuid) => state.app.list_projects_by_participant(site_uuid).await?,
        None => state.app.list_projects().await?,
    };
    Ok(ApiResponse::success(projects))
}

async fn process_invitation(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ProjectInvitationRequest>, JsonRejection>,
) -> ApiResult<()> {
    let Json(request) = payload?;
    state.app.process_invitation(request).await?;
    Ok(done())
}

async fn accept_invitation(State(state): State<Arc<AppState>>, Path(uuid): Path<Uuid>) -> ApiResult<()> {
    state.app.process_invitation_acceptance(uuid).await?;
    Ok(done())
}

async fn reject_invitation(State(state): State<Arc<AppState>>, Path(uuid): Path<Uuid>) -> ApiResult<()> {
    state.app.process_invitation_rejection(uuid).await?;
    Ok(done())
}

async fn revoke_invitation(State(state): State<Arc<AppState>>, Path(uuid): Path<Uuid>) -> ApiResult<()> {
    state.app.process_invitation_revocation(uuid).await?;
    Ok(done())
}

async fn list_participants(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<Uuid>,
) -> ApiResult<Vec<ProjectParticipant>> {
    Ok(ApiResponse::success(state.app.list_project_participants(uuid).await?))
}

async fn participant_leave(
    State(state): State<Arc<AppState>>,
    Path((uuid, site_uuid)): Path<(Uuid, Uuid)>,
) -> ApiResult<()> {
    state.app.process_participant_leaving(uuid, site_uuid).await?;
    Ok(done())
}

async fn participant_dismiss(
    State(state): State<Arc<AppState>>,
    Path((uuid, site_uuid)): Path<(Uuid, Uuid)>,
) -> ApiResult<()> {
    state.app.process_participant_dismissal(uuid, site_uuid).await?;
    Ok(done())
}

async fn list_data(State(state): State<Arc<AppState>>, Path(uuid): Path<Uuid>) -> ApiResult<Vec<ProjectData>> {
    Ok(ApiResponse::success(state.app.list_project_data(uuid).await?))
}

async fn associate_data(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<Uuid>,
    payload: Result<Json<DataAssociationItem>, JsonRejection>,
) -> ApiResult<ProjectData> {
    let Json(item) = payload?;
    Ok(ApiResponse::success(state.app.process_data_association(uuid, item).await?))
}

async fn dismiss_data(
    State(state): State<Arc<AppState>>,
    Path((uuid, data_uuid)): Path<(Uuid, Uuid)>,
) -> ApiResult<()> {
    state.app.process_data_dismissal(uuid, data_uuid).await?;
    Ok(done())
}

async fn close_project(State(state): State<Arc<AppState>>, Path(uuid): Path<Uuid>) -> ApiResult<()> {
    state.app.process_project_closing(uuid).await?;
    Ok(done())
}

async fn list_project_jobs(State(state): State<Arc<AppState>>, Path(uuid): Path<Uuid>) -> ApiResult<Vec<Job>> {
    Ok(ApiResponse::success(state.app.list_project_jobs(uuid).await?))
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// The body is kept as text so it can be forwarded byte for byte.
async fn create_job(State(state): State<Arc<AppState>>, body: String) -> ApiResult<Job> {
    Ok(ApiResponse::success(state.app.process_job_creation(body).await?))
}

async fn get_job(State(state): State<Arc<AppState>>, Path(uuid): Path<Uuid>) -> ApiResult<JobDetail> {
    Ok(ApiResponse::success(state.app.get_job(uuid).await?))
}

async fn job_approval_response(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<Uuid>,
    payload: Result<Json<JobApprovalMessage>, JsonRejection>,
) -> ApiResult<()> {
    let Json(response) = payload?;
    if response.job_uuid != uuid {
        return Err(ApiError::bad_request(format!(
            "job uuid {} in body does not match path {}",
            response.job_uuid, uuid
        )));
    }
    state.app.process_job_approval_response(response).await?;
    Ok(done())
}

async fn job_status_update(State(state): State<Arc<AppState>>, Path(uuid): Path<Uuid>, body: String) -> ApiResult<()> {
    let parsed: serde_json::Value =
        serde_json::from_str(&body).map_err(|e| ApiError::bad_request(format!("malformed request: {}", e)))?;
    let reported = parsed
        .get("job_uuid")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok());
    if reported != Some(uuid) {
        return Err(ApiError::bad_request(format!("status report does not belong to job {}", uuid)));
    }
    state.app.process_job_status_update(body).await?;
    Ok(done())
}
