//! Sensor collaborator CRUD (§3 `Sensor`, §6).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::auth::{ProjectActor, ProjectRole};
use crate::domain::error::DomainResult;
use crate::domain::sensors::{self, Sensor};

use super::AppState;

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

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateSensorRequest {
    pub project_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub input_unit: String,
    pub display_unit: String,
    pub calibration_notes: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CreateSensorResponse {
    #[serde(flatten)]
    #[schema(inline)]
    pub sensor: Sensor,
    /// The plaintext bearer token, returned exactly once at creation time.
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SensorsPage {
    pub total: i64,
    pub sensors: Vec<Sensor>,
}

#[derive(Debug, Serialize)]
pub struct RotateTokenResponse {
    #[serde(flatten)]
    pub sensor: Sensor,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveProfileRequest {
    pub conversion_profile_id: Option<Uuid>,
}

#[utoipa::path(
    post,
    path = "/api/v1/sensors",
    tag = "sensors",
    request_body = CreateSensorRequest,
    responses((status = 200, description = "Sensor created", body = CreateSensorResponse)),
)]
pub async fn create(
    State(state): State<AppState>,
    actor: ProjectActor,
    Json(request): Json<CreateSensorRequest>,
) -> DomainResult<Json<CreateSensorResponse>> {
    actor.require_at_least(ProjectRole::Editor)?;

    let (token, preview) = sensors::generate_token();
    let token_hash = sensors::hash_token(&token, &state.config.sensor_token_pepper);

    let sensor = sensors::create(
        &state.db,
        sensors::CreateSensor {
            project_id: request.project_id,
            name: request.name,
            sensor_type: request.sensor_type,
            input_unit: request.input_unit,
            display_unit: request.display_unit,
            calibration_notes: request.calibration_notes,
        },
        &token_hash,
        &preview,
    )
    .await?;

    Ok(Json(CreateSensorResponse { sensor, token }))
}

/// `GET /api/v1/sensors/{id}`: flat lookup, no project scope in the path
/// (§6).
pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> DomainResult<Json<Sensor>> {
    let sensor = sensors::get_by_id(&state.db, id).await?;
    Ok(Json(sensor))
}

pub async fn list_by_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(page): Query<PaginationParams>,
) -> DomainResult<Json<SensorsPage>> {
    let limit = page.limit.clamp(1, 200);
    let offset = page.offset.max(0);
    let (sensors, total) = sensors::list_by_project(&state.db, project_id, limit, offset).await?;
    Ok(Json(SensorsPage { total, sensors }))
}

pub async fn rotate_token(
    State(state): State<AppState>,
    actor: ProjectActor,
    Path(id): Path<Uuid>,
) -> DomainResult<Json<RotateTokenResponse>> {
    actor.require_at_least(ProjectRole::Editor)?;

    let (token, preview) = sensors::generate_token();
    let token_hash = sensors::hash_token(&token, &state.config.sensor_token_pepper);
    let sensor = sensors::rotate_token_by_id(&state.db, id, &token_hash, &preview).await?;
    Ok(Json(RotateTokenResponse { sensor, token }))
}

/// `POST /api/v1/sensors/{id}/profile`: set (or clear) the sensor's
/// active profile id directly, mostly exercised indirectly via profile
/// publish (§6).
pub async fn set_profile(
    State(state): State<AppState>,
    actor: ProjectActor,
    Path(id): Path<Uuid>,
    Json(request): Json<SetActiveProfileRequest>,
) -> DomainResult<Json<Sensor>> {
    actor.require_at_least(ProjectRole::Editor)?;
    let sensor = sensors::set_active_profile(&state.db, id, request.conversion_profile_id).await?;
    state.profile_cache.invalidate(id);
    Ok(Json(sensor))
}

pub async fn delete(
    State(state): State<AppState>,
    actor: ProjectActor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, crate::domain::error::DomainError> {
    actor.require_at_least(ProjectRole::Owner)?;
    sensors::delete_by_id(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
