//! Experiment repository (minimal collaborator surface).
//!
//! Status machine: draft -> running -> {succeeded, failed, archived}.
//! Archiving forbids further runs (checked in `runs::create`).

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::error::{DomainError, DomainResult};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Experiment {
    pub id: Uuid,
    pub project_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub tags: Vec<String>,
    pub metadata: Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

pub struct CreateExperiment {
    pub project_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub tags: Vec<String>,
    pub metadata: Value,
}

pub async fn create(pool: &PgPool, data: CreateExperiment) -> DomainResult<Experiment> {
    let experiment: Experiment = sqlx::query_as(
        r#"
        INSERT INTO experiments (project_id, owner_id, name, tags, metadata, status)
        VALUES ($1, $2, $3, $4, $5, 'draft')
        RETURNING *
        "#,
    )
    .bind(data.project_id)
    .bind(data.owner_id)
    .bind(&data.name)
    .bind(&data.tags)
    .bind(&data.metadata)
    .fetch_one(pool)
    .await?;
    Ok(experiment)
}

pub async fn get(pool: &PgPool, project_id: Uuid, experiment_id: Uuid) -> DomainResult<Experiment> {
    let experiment: Option<Experiment> =
        sqlx::query_as("SELECT * FROM experiments WHERE project_id = $1 AND id = $2")
            .bind(project_id)
            .bind(experiment_id)
            .fetch_optional(pool)
            .await?;
    experiment.ok_or_else(|| DomainError::NotFound("Experiment not found".into()))
}

pub async fn list_by_project(pool: &PgPool, project_id: Uuid) -> DomainResult<Vec<Experiment>> {
    let experiments: Vec<Experiment> = sqlx::query_as(
        "SELECT * FROM experiments WHERE project_id = $1 ORDER BY created_at DESC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(experiments)
}

pub async fn archive(pool: &PgPool, project_id: Uuid, experiment_id: Uuid) -> DomainResult<Experiment> {
    let experiment: Option<Experiment> = sqlx::query_as(
        r#"
        UPDATE experiments
        SET status = 'archived', archived_at = now(), updated_at = now()
        WHERE project_id = $1 AND id = $2
        RETURNING *
        "#,
    )
    .bind(project_id)
    .bind(experiment_id)
    .fetch_optional(pool)
    .await?;
    experiment.ok_or_else(|| DomainError::NotFound("Experiment not found".into()))
}
