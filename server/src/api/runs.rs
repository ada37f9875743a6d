//! Run collaborator CRUD (§3 `Run`, §6).

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::error::DomainResult;
use crate::domain::runs::{self, Run};
use crate::webhooks::events::{self, DomainEvent};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    pub project_id: Uuid,
    #[serde(default = "default_params")]
    pub params: Value,
    pub git_sha: Option<String>,
    pub env: Option<String>,
    #[serde(default)]
    pub sensor_ids: Vec<Uuid>,
}

fn default_params() -> Value {
    Value::Object(serde_json::Map::new())
}

#[derive(Debug, Deserialize)]
pub struct UpdateRunStatusRequest {
    pub status: String,
}

pub async fn create(
    State(state): State<AppState>,
    Path(experiment_id): Path<Uuid>,
    Json(request): Json<CreateRunRequest>,
) -> DomainResult<Json<Run>> {
    let run = runs::create(
        &state.db,
        runs::CreateRun {
            experiment_id,
            project_id: request.project_id,
            params: request.params,
            git_sha: request.git_sha,
            env: request.env,
            sensor_ids: request.sensor_ids,
        },
    )
    .await?;
    Ok(Json(run))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> DomainResult<Json<Run>> {
    let run = runs::get(&state.db, id).await?;
    Ok(Json(run))
}

pub async fn list_by_experiment(
    State(state): State<AppState>,
    Path(experiment_id): Path<Uuid>,
) -> DomainResult<Json<Vec<Run>>> {
    let runs = runs::list_by_experiment(&state.db, experiment_id).await?;
    Ok(Json(runs))
}

/// `POST /api/v1/runs/{id}:transition`. Emits `run.started` when the run
/// enters `running` (§4.5 "run started").
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRunStatusRequest>,
) -> DomainResult<Json<Run>> {
    let run = runs::update_status(&state.db, id, &request.status).await?;

    if run.status == "running" {
        let _ = events::emit(
            &state.db,
            &DomainEvent {
                project_id: run.project_id,
                event_type: "run.started".to_string(),
                payload: serde_json::json!({"run_id": run.id, "experiment_id": run.experiment_id}),
            },
        )
        .await;
    }

    Ok(Json(run))
}
