//! Backfill task explicit-enqueue and lookup endpoints (§3 `BackfillTask`,
//! §4.4, §6). Most tasks are created implicitly by
//! [`super::conversion_profiles::publish`]; this module covers the
//! explicit API `spec.md` §3 also allows.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backfill::error::BackfillResult;
use crate::backfill::store;
use crate::backfill::types::BackfillTask;
use crate::domain::auth::{ProjectActor, ProjectRole};

use super::AppState;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateBackfillTaskRequest {
    pub sensor_id: Uuid,
    pub project_id: Uuid,
    pub conversion_profile_id: Uuid,
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
pub struct BackfillTasksPage {
    pub total: i64,
    pub tasks: Vec<BackfillTask>,
}

/// `POST /api/v1/backfill-tasks` (explicit enqueue, per `spec.md` §3 "or
/// explicit API").
#[utoipa::path(
    post,
    path = "/api/v1/backfill-tasks",
    tag = "backfill",
    request_body = CreateBackfillTaskRequest,
    responses((status = 200, description = "Backfill task enqueued", body = BackfillTask)),
)]
pub async fn create(
    State(state): State<AppState>,
    actor: ProjectActor,
    Json(request): Json<CreateBackfillTaskRequest>,
) -> BackfillResult<Json<BackfillTask>> {
    if let Err(rejection) = actor.require_at_least(ProjectRole::Editor) {
        return Err(crate::backfill::error::BackfillError::Forbidden(
            rejection.to_string(),
        ));
    }

    let task = store::create(
        &state.db,
        crate::backfill::types::CreateBackfillTask {
            sensor_id: request.sensor_id,
            project_id: request.project_id,
            conversion_profile_id: request.conversion_profile_id,
            created_by: Some(actor.user_id),
        },
    )
    .await?;
    Ok(Json(task))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> BackfillResult<Json<BackfillTask>> {
    let task = store::get(&state.db, id).await?;
    Ok(Json(task))
}

pub async fn list_by_sensor(
    State(state): State<AppState>,
    Path(sensor_id): Path<Uuid>,
    Query(page): Query<PaginationParams>,
) -> BackfillResult<Json<BackfillTasksPage>> {
    let limit = page.limit.clamp(1, 200);
    let offset = page.offset.max(0);
    let (tasks, total) = store::list_by_sensor(&state.db, sensor_id, limit, offset).await?;
    Ok(Json(BackfillTasksPage { total, tasks }))
}
