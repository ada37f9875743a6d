//! Capture session collaborator CRUD and audit log (§3 `CaptureSession`,
//! §4.7, §6).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::auth::ProjectActor;
use crate::domain::capture_session_events::{self, CaptureSessionEvent};
use crate::domain::capture_sessions::{self, CaptureSession};
use crate::domain::error::DomainResult;
use crate::webhooks::events::{self, DomainEvent};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCaptureSessionRequest {
    pub project_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct EventsPage {
    pub total: i64,
    pub events: Vec<CaptureSessionEvent>,
}

/// `POST /api/v1/runs/{id}/capture-sessions` (§4.5 "capture session
/// created").
pub async fn create(
    State(state): State<AppState>,
    actor: ProjectActor,
    Path(run_id): Path<Uuid>,
    Json(request): Json<CreateCaptureSessionRequest>,
) -> DomainResult<Json<CaptureSession>> {
    let session = capture_sessions::create(
        &state.db,
        capture_sessions::CreateCaptureSession {
            run_id,
            project_id: request.project_id,
            initiated_by: actor.user_id,
            actor_role: format!("{:?}", actor.role).to_lowercase(),
        },
    )
    .await?;

    let _ = events::emit(
        &state.db,
        &DomainEvent {
            project_id: request.project_id,
            event_type: "capture_session.created".to_string(),
            payload: serde_json::json!({"capture_session_id": session.id, "run_id": run_id}),
        },
    )
    .await;

    Ok(Json(session))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> DomainResult<Json<CaptureSession>> {
    let session = capture_sessions::get_by_id(&state.db, id)
        .await
        .map_err(crate::domain::error::DomainError::Database)?
        .ok_or_else(|| crate::domain::error::DomainError::NotFound("Capture session not found".into()))?;
    Ok(Json(session))
}

pub async fn list_by_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> DomainResult<Json<Vec<CaptureSession>>> {
    let sessions = capture_sessions::list_by_run_id(&state.db, run_id).await?;
    Ok(Json(sessions))
}

/// `POST /api/v1/capture-sessions/{id}:stop` (§4.5 "capture session
/// stopped").
pub async fn stop(
    State(state): State<AppState>,
    actor: ProjectActor,
    Path(id): Path<Uuid>,
) -> DomainResult<Json<CaptureSession>> {
    let actor_role = format!("{:?}", actor.role).to_lowercase();
    let session = capture_sessions::stop_by_id(&state.db, id, actor.user_id, &actor_role).await?;

    let _ = events::emit(
        &state.db,
        &DomainEvent {
            project_id: session.project_id,
            event_type: "capture_session.stopped".to_string(),
            payload: serde_json::json!({"capture_session_id": session.id}),
        },
    )
    .await;

    Ok(Json(session))
}

pub async fn delete(
    State(state): State<AppState>,
    actor: ProjectActor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, crate::domain::error::DomainError> {
    let actor_role = format!("{:?}", actor.role).to_lowercase();
    capture_sessions::delete_by_id(&state.db, id, actor.user_id, &actor_role).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/v1/capture-sessions/{id}/events` (§4.7).
pub async fn list_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<PaginationParams>,
) -> DomainResult<Json<EventsPage>> {
    let limit = page.limit.clamp(1, 200);
    let offset = page.offset.max(0);
    let (events, total) = capture_session_events::list_by_session(&state.db, id, limit, offset).await?;
    Ok(Json(EventsPage { total, events }))
}
