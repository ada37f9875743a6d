//! Conversion profile collaborator CRUD (§3 `ConversionProfile`, §4.5 step
//! "profile.published").

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::auth::{ProjectActor, ProjectRole};
use crate::domain::conversion_profiles::{self, ConversionProfile};
use crate::domain::error::DomainResult;
use crate::domain::sensors;
use crate::webhooks::events::{self, DomainEvent};

use super::AppState;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateProfileRequest {
    pub version: String,
    pub kind: String,
    #[schema(value_type = Object)]
    pub payload: Value,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PublishResponse {
    #[serde(flatten)]
    #[schema(inline)]
    pub profile: ConversionProfile,
    /// Id of the backfill task enqueued for pre-existing readings, if any
    /// (§4.5 "profile.published" only fires a backfill when one is
    /// actually needed — a profile retiring a prior active one).
    pub backfill_task_id: Option<Uuid>,
}

#[utoipa::path(
    post,
    path = "/api/v1/sensors/{id}/conversion-profiles",
    tag = "conversion-profiles",
    params(("id" = Uuid, Path, description = "Sensor id")),
    request_body = CreateProfileRequest,
    responses((status = 200, description = "Draft profile created", body = ConversionProfile)),
)]
pub async fn create(
    State(state): State<AppState>,
    actor: ProjectActor,
    Path(sensor_id): Path<Uuid>,
    Json(request): Json<CreateProfileRequest>,
) -> DomainResult<Json<ConversionProfile>> {
    actor.require_at_least(ProjectRole::Editor)?;
    let profile = conversion_profiles::create(
        &state.db,
        conversion_profiles::CreateProfile {
            sensor_id,
            version: request.version,
            kind: request.kind,
            payload: request.payload,
        },
    )
    .await?;
    Ok(Json(profile))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> DomainResult<Json<ConversionProfile>> {
    let profile = conversion_profiles::get(&state.db, id).await?;
    Ok(Json(profile))
}

pub async fn list_by_sensor(
    State(state): State<AppState>,
    Path(sensor_id): Path<Uuid>,
) -> DomainResult<Json<Vec<ConversionProfile>>> {
    let profiles = conversion_profiles::list_by_sensor(&state.db, sensor_id).await?;
    Ok(Json(profiles))
}

/// `POST /api/v1/conversion-profiles/{id}:publish` (§4.5 "profile.published"):
/// promote the draft to active, invalidate the sensor's cached active
/// profile, and — only when a prior active profile actually existed —
/// enqueue a backfill task plus a domain event.
#[utoipa::path(
    post,
    path = "/api/v1/conversion-profiles/{id}:publish",
    tag = "conversion-profiles",
    params(("id" = Uuid, Path, description = "Conversion profile id")),
    responses((status = 200, description = "Profile published", body = PublishResponse)),
)]
pub async fn publish(
    State(state): State<AppState>,
    actor: ProjectActor,
    Path(id): Path<Uuid>,
) -> DomainResult<Json<PublishResponse>> {
    actor.require_at_least(ProjectRole::Editor)?;

    let (profile, had_prior_active) = conversion_profiles::publish(&state.db, id).await?;
    state.profile_cache.invalidate(profile.sensor_id);
    sensors::set_active_profile(&state.db, profile.sensor_id, Some(profile.id)).await?;

    let sensor = sensors::get_by_id(&state.db, profile.sensor_id).await?;

    let backfill_task_id = if had_prior_active {
        let task = crate::backfill::store::create(
            &state.db,
            crate::backfill::types::CreateBackfillTask {
                sensor_id: profile.sensor_id,
                project_id: sensor.project_id,
                conversion_profile_id: profile.id,
                created_by: Some(actor.user_id),
            },
        )
        .await
        .map_err(|e| match e {
            crate::backfill::error::BackfillError::Database(db_err) => {
                crate::domain::error::DomainError::Database(db_err)
            }
            other => crate::domain::error::DomainError::Conflict(other.to_string()),
        })?;
        Some(task.id)
    } else {
        None
    };

    let _ = events::emit(
        &state.db,
        &DomainEvent {
            project_id: sensor.project_id,
            event_type: "profile.published".to_string(),
            payload: serde_json::json!({
                "sensor_id": profile.sensor_id,
                "conversion_profile_id": profile.id,
                "version": profile.version,
                "backfill_task_id": backfill_task_id,
            }),
        },
    )
    .await;

    Ok(Json(PublishResponse {
        profile,
        backfill_task_id,
    }))
}
