use axum::{
    extract::{FromRequest, FromRequestParts, Path, Request, State},
    http::{header, request::Parts, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::error::PlannerError;
use crate::export::{self, ExportDocument};
use crate::models::*;
use crate::store::SessionRecord;
use crate::tracker::{CredentialsInput, TrackerDefaults, TrackerIdentity, TrackerProject, UploadReport};
use crate::validator;

type ApiResult<T> = Result<T, (StatusCode, String)>;

// ============================================================
// Error Handling
// ============================================================

/// Map a planner error onto a status code. Every variant is a condition
/// the client can act on, so the message is passed through.
fn api_error(e: PlannerError) -> (StatusCode, String) {
    let status = match &e {
        PlannerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PlannerError::NotFound { .. } => StatusCode::NOT_FOUND,
        PlannerError::GenerationFailed { .. } => StatusCode::BAD_GATEWAY,
        PlannerError::Superseded { .. } => StatusCode::CONFLICT,
        PlannerError::PreconditionFailed(_) => StatusCode::CONFLICT,
        PlannerError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
        PlannerError::ProjectNotFound(_) => StatusCode::NOT_FOUND,
        PlannerError::NetworkError(_) => StatusCode::BAD_GATEWAY,
    };

    let msg = e.to_string();
    if status.is_server_error() {
        tracing::error!("Upstream error: {}", msg);
    } else {
        tracing::warn!("Request error: {}", msg);
    }
    (status, msg)
}

// ============================================================
// Extractors
// ============================================================

/// `Path` whose rejection is reported like any other invalid input.
pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<T>::from_request_parts(parts, state)
            .await
            .map(|Path(value)| Self(value))
            .map_err(|rejection| api_error(PlannerError::InvalidInput(rejection.body_text())))
    }
}

/// `Json` whose rejection is reported like any other invalid input.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| Self(value))
            .map_err(|rejection| api_error(PlannerError::InvalidInput(rejection.body_text())))
    }
}

// ============================================================
// Health
// ============================================================

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "reasoning_backend": state.pipeline.backend_name(),
    }))
}

// ============================================================
// Sessions
// ============================================================

pub async fn create_session(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<CreateSessionInput>,
) -> ApiResult<(StatusCode, Json<SessionView>)> {
    state
        .pipeline
        .create_session(&input.objective)
        .map(|view| (StatusCode::CREATED, Json(view)))
        .map_err(api_error)
}

pub async fn get_session(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<SessionView>> {
    state
        .pipeline
        .store()
        .read(id, SessionRecord::view)
        .map(Json)
        .map_err(api_error)
}

pub async fn delete_session(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    state.pipeline.store().remove(id).map_err(api_error)?;
    tracing::info!(session_id = %id, "deleted session");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================
// Pipeline Stages
// ============================================================

pub async fn suggest_key_results(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<StageOutcome<KeyResult>>> {
    state
        .pipeline
        .suggest_key_results(id)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn generate_epics(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<SelectKeyResultInput>,
) -> ApiResult<Json<StageOutcome<EpicNode>>> {
    state
        .pipeline
        .generate_epics(id, &input.key_result_id)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn generate_stories(
    State(state): State<AppState>,
    ApiPath((id, feature_id)): ApiPath<(Uuid, String)>,
) -> ApiResult<Json<StageOutcome<StoryNode>>> {
    state
        .pipeline
        .generate_stories(id, &feature_id)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn generate_tasks(
    State(state): State<AppState>,
    ApiPath((id, story_id)): ApiPath<(Uuid, String)>,
) -> ApiResult<Json<StageOutcome<Task>>> {
    state
        .pipeline
        .generate_tasks(id, &story_id)
        .await
        .map(Json)
        .map_err(api_error)
}

// ============================================================
// Review
// ============================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub warnings: Vec<String>,
}

pub async fn validate_session(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ValidationResponse>> {
    let warnings = state
        .pipeline
        .store()
        .read(id, validator::validate)
        .map_err(api_error)?;
    Ok(Json(ValidationResponse { warnings }))
}

pub async fn export_session(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ExportDocument>> {
    state
        .pipeline
        .store()
        .read(id, export::export)
        .map(Json)
        .map_err(api_error)
}

pub async fn outline_session(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let doc = state
        .pipeline
        .store()
        .read(id, export::export)
        .map_err(api_error)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        export::render_outline(&doc),
    ))
}

// ============================================================
// Tracker
// ============================================================

pub async fn tracker_config(State(state): State<AppState>) -> Json<TrackerDefaults> {
    Json(TrackerDefaults::from(state.tracker_defaults.as_ref()))
}

pub async fn tracker_test(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<CredentialsInput>,
) -> ApiResult<Json<TrackerIdentity>> {
    let creds = input.resolve(&state.tracker_defaults).map_err(api_error)?;
    state
        .reconciler
        .test_connection(&creds)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn tracker_projects(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<CredentialsInput>,
) -> ApiResult<Json<Vec<TrackerProject>>> {
    let creds = input.resolve_account(&state.tracker_defaults).map_err(api_error)?;
    state
        .reconciler
        .list_projects(&creds)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn tracker_upload(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<CredentialsInput>,
) -> ApiResult<Json<UploadReport>> {
    let snapshot = state.pipeline.store().snapshot(id).map_err(api_error)?;
    let creds = input.resolve(&state.tracker_defaults).map_err(api_error)?;
    state
        .reconciler
        .upload(&snapshot, &creds)
        .await
        .map(Json)
        .map_err(api_error)
}
