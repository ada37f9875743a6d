//! Experiment collaborator CRUD (§3 `Experiment`, §6).

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::auth::{ProjectActor, ProjectRole};
use crate::domain::error::DomainResult;
use crate::domain::experiments::{self, Experiment};
use crate::webhooks::events::{self, DomainEvent};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateExperimentRequest {
    pub project_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_metadata")]
    pub metadata: Value,
}

fn default_metadata() -> Value {
    Value::Object(serde_json::Map::new())
}

/// `POST /api/v1/experiments` (§6).
pub async fn create(
    State(state): State<AppState>,
    actor: ProjectActor,
    Json(request): Json<CreateExperimentRequest>,
) -> DomainResult<Json<Experiment>> {
    actor.require_at_least(ProjectRole::Editor)?;
    let experiment = experiments::create(
        &state.db,
        experiments::CreateExperiment {
            project_id: request.project_id,
            owner_id: actor.user_id,
            name: request.name,
            tags: request.tags,
            metadata: request.metadata,
        },
    )
    .await?;
    Ok(Json(experiment))
}

pub async fn get(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(Uuid, Uuid)>,
) -> DomainResult<Json<Experiment>> {
    let experiment = experiments::get(&state.db, project_id, id).await?;
    Ok(Json(experiment))
}

pub async fn list(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> DomainResult<Json<Vec<Experiment>>> {
    let experiments = experiments::list_by_project(&state.db, project_id).await?;
    Ok(Json(experiments))
}

/// `POST /api/v1/projects/{project_id}/experiments/{id}:archive`. Emits
/// `experiment.archived` so subscribers can stop watching the experiment.
pub async fn archive(
    State(state): State<AppState>,
    actor: ProjectActor,
    Path((project_id, id)): Path<(Uuid, Uuid)>,
) -> DomainResult<Json<Experiment>> {
    actor.require_at_least(ProjectRole::Editor)?;
    let experiment = experiments::archive(&state.db, project_id, id).await?;

    let _ = events::emit(
        &state.db,
        &DomainEvent {
            project_id,
            event_type: "experiment.archived".to_string(),
            payload: serde_json::json!({"experiment_id": experiment.id}),
        },
    )
    .await;

    Ok(Json(experiment))
}
