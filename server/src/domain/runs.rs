//! Run repository (minimal collaborator surface).
//!
//! Lifecycle: draft -> running -> terminal (`succeeded` | `failed`). A run
//! references zero or more sensors via `run_sensors`, which the Telemetry
//! Ingest Service's scope validation and the sensor-deletion guard both
//! read through.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::error::{DomainError, DomainResult};

const TERMINAL_STATUSES: &[&str] = &["succeeded", "failed"];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Run {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub project_id: Uuid,
    pub params: Value,
    pub git_sha: Option<String>,
    pub env: Option<String>,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        TERMINAL_STATUSES.contains(&self.status.as_str())
    }
}

pub struct CreateRun {
    pub experiment_id: Uuid,
    pub project_id: Uuid,
    pub params: Value,
    pub git_sha: Option<String>,
    pub env: Option<String>,
    pub sensor_ids: Vec<Uuid>,
}

pub async fn create(pool: &PgPool, data: CreateRun) -> DomainResult<Run> {
    let experiment_status: Option<(String,)> =
        sqlx::query_as("SELECT status FROM experiments WHERE id = $1")
            .bind(data.experiment_id)
            .fetch_optional(pool)
            .await?;
    let (experiment_status,) =
        experiment_status.ok_or_else(|| DomainError::NotFound("Experiment not found".into()))?;
    if experiment_status == "archived" {
        return Err(DomainError::Conflict(
            "cannot create a run under an archived experiment".into(),
        ));
    }

    let mut tx = pool.begin().await?;
    let run: Run = sqlx::query_as(
        r#"
        INSERT INTO runs (experiment_id, project_id, params, git_sha, env, status)
        VALUES ($1, $2, $3, $4, $5, 'draft')
        RETURNING *
        "#,
    )
    .bind(data.experiment_id)
    .bind(data.project_id)
    .bind(&data.params)
    .bind(&data.git_sha)
    .bind(&data.env)
    .fetch_one(&mut *tx)
    .await?;

    for sensor_id in &data.sensor_ids {
        sqlx::query(
            "INSERT INTO run_sensors (run_id, sensor_id, project_id) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(run.id)
        .bind(sensor_id)
        .bind(data.project_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(run)
}

pub async fn get(pool: &PgPool, run_id: Uuid) -> DomainResult<Run> {
    let run: Option<Run> = sqlx::query_as("SELECT * FROM runs WHERE id = $1")
        .bind(run_id)
        .fetch_optional(pool)
        .await?;
    run.ok_or_else(|| DomainError::NotFound("Run not found".into()))
}

pub async fn list_by_experiment(pool: &PgPool, experiment_id: Uuid) -> DomainResult<Vec<Run>> {
    let runs: Vec<Run> = sqlx::query_as(
        "SELECT * FROM runs WHERE experiment_id = $1 ORDER BY created_at DESC",
    )
    .bind(experiment_id)
    .fetch_all(pool)
    .await?;
    Ok(runs)
}

pub async fn update_status(pool: &PgPool, run_id: Uuid, status: &str) -> DomainResult<Run> {
    let run = get(pool, run_id).await?;
    if run.is_terminal() {
        return Err(DomainError::Conflict("run is already terminal".into()));
    }
    let timestamp_column = match status {
        "running" => "started_at",
        "succeeded" | "failed" => "finished_at",
        _ => {
            return Err(DomainError::Validation(format!(
                "unsupported run status transition: {status}"
            )))
        }
    };
    let query = format!(
        "UPDATE runs SET status = $2, {timestamp_column} = now(), updated_at = now() WHERE id = $1 RETURNING *"
    );
    let updated: Option<Run> = sqlx::query_as(&query)
        .bind(run_id)
        .bind(status)
        .fetch_optional(pool)
        .await?;
    updated.ok_or_else(|| DomainError::NotFound("Run not found".into()))
}
