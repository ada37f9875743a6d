//! Sensor repository.
//!
//! Implements the dual-membership pattern from `spec.md` §9 verbatim:
//! `sensors.project_id` is the legacy/primary project, `sensor_projects`
//! is the newer many-to-many mapping. Both are consulted on every
//! membership check so that sensors created before `sensor_projects`
//! existed keep working. This is an intentionally preserved open question
//! (see `DESIGN.md`), not a bug.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use super::error::{DomainError, DomainResult};

#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct Sensor {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    #[sqlx(rename = "type")]
    pub sensor_type: String,
    pub input_unit: String,
    pub display_unit: String,
    pub status: String,
    #[serde(skip_serializing)]
    pub token_hash: Option<String>,
    pub token_preview: Option<String>,
    pub active_profile_id: Option<Uuid>,
    pub calibration_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Hash a bearer token for storage/comparison. Plain SHA-256 over the
/// token plus a server-side pepper — deliberately cheaper than the
/// teacher's Argon2 password hashing, since this hash sits on the
/// 500 Hz ingest hot path rather than an interactive login form.
#[must_use]
pub fn hash_token(token: &str, pepper: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.update(pepper.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a new random sensor token and its preview (first 8 chars).
#[must_use]
pub fn generate_token() -> (String, String) {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = hex::encode(bytes);
    let preview = token.chars().take(8).collect();
    (token, preview)
}

pub struct CreateSensor {
    pub project_id: Uuid,
    pub name: String,
    pub sensor_type: String,
    pub input_unit: String,
    pub display_unit: String,
    pub calibration_notes: Option<String>,
}

pub async fn create(
    pool: &PgPool,
    data: CreateSensor,
    token_hash: &str,
    token_preview: &str,
) -> DomainResult<Sensor> {
    let mut tx = pool.begin().await?;
    let sensor: Sensor = sqlx::query_as(
        r#"
        INSERT INTO sensors (
            project_id, name, type, input_unit, display_unit, status,
            token_hash, token_preview, calibration_notes
        )
        VALUES ($1, $2, $3, $4, $5, 'active', $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(data.project_id)
    .bind(&data.name)
    .bind(&data.sensor_type)
    .bind(&data.input_unit)
    .bind(&data.display_unit)
    .bind(token_hash)
    .bind(token_preview)
    .bind(&data.calibration_notes)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO sensor_projects (sensor_id, project_id, created_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (sensor_id, project_id) DO NOTHING
        "#,
    )
    .bind(sensor.id)
    .bind(data.project_id)
    .bind(sensor.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(sensor)
}

/// Get a sensor, checking membership via both `sensors.project_id` and
/// `sensor_projects` (see module docs).
pub async fn get(pool: &PgPool, project_id: Uuid, sensor_id: Uuid) -> DomainResult<Sensor> {
    let sensor: Option<Sensor> = sqlx::query_as(
        r#"
        SELECT s.*
        FROM sensors s
        LEFT JOIN sensor_projects sp
          ON s.id = sp.sensor_id AND sp.project_id = $2
        WHERE s.id = $1
          AND (s.project_id = $2 OR sp.project_id = $2)
        "#,
    )
    .bind(sensor_id)
    .bind(project_id)
    .fetch_optional(pool)
    .await?;

    sensor.ok_or_else(|| DomainError::NotFound("Sensor not found".into()))
}

/// Get a sensor by id without a project membership check, for internal
/// use (ingest authentication, backfill worker).
pub async fn get_by_id(pool: &PgPool, sensor_id: Uuid) -> DomainResult<Sensor> {
    let sensor: Option<Sensor> = sqlx::query_as("SELECT * FROM sensors WHERE id = $1")
        .bind(sensor_id)
        .fetch_optional(pool)
        .await?;
    sensor.ok_or_else(|| DomainError::NotFound("Sensor not found".into()))
}

/// Authenticate a sensor by id + bearer token hash (§4.3 step 1).
pub async fn get_by_token_hash(
    pool: &PgPool,
    sensor_id: Uuid,
    token_hash: &str,
) -> Result<Option<Sensor>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM sensors WHERE id = $1 AND token_hash = $2")
        .bind(sensor_id)
        .bind(token_hash)
        .fetch_optional(pool)
        .await
}

pub async fn list_by_project(
    pool: &PgPool,
    project_id: Uuid,
    limit: i64,
    offset: i64,
) -> DomainResult<(Vec<Sensor>, i64)> {
    let sensors: Vec<Sensor> = sqlx::query_as(
        r#"
        SELECT s.*
        FROM sensors s
        LEFT JOIN sensor_projects sp
          ON s.id = sp.sensor_id AND sp.project_id = $1
        WHERE s.project_id = $1 OR sp.project_id = $1
        ORDER BY s.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(project_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM sensors s
        WHERE s.project_id = $1
           OR EXISTS (SELECT 1 FROM sensor_projects sp WHERE sp.sensor_id = s.id AND sp.project_id = $1)
        "#,
    )
    .bind(project_id)
    .fetch_one(pool)
    .await?;

    Ok((sensors, total))
}

pub async fn rotate_token(
    pool: &PgPool,
    project_id: Uuid,
    sensor_id: Uuid,
    token_hash: &str,
    token_preview: &str,
) -> DomainResult<Sensor> {
    get(pool, project_id, sensor_id).await?;
    rotate_token_by_id(pool, sensor_id, token_hash, token_preview).await
}

/// Rotate a sensor's token by id alone, for the flat
/// `POST /api/v1/sensors/{id}/token:rotate` route, which carries no
/// project scope in its path (§6).
pub async fn rotate_token_by_id(
    pool: &PgPool,
    sensor_id: Uuid,
    token_hash: &str,
    token_preview: &str,
) -> DomainResult<Sensor> {
    let sensor: Option<Sensor> = sqlx::query_as(
        r#"
        UPDATE sensors
        SET token_hash = $2, token_preview = $3, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(sensor_id)
    .bind(token_hash)
    .bind(token_preview)
    .fetch_optional(pool)
    .await?;
    sensor.ok_or_else(|| DomainError::NotFound("Sensor not found".into()))
}

pub async fn set_active_profile(
    pool: &PgPool,
    sensor_id: Uuid,
    profile_id: Option<Uuid>,
) -> DomainResult<Sensor> {
    let sensor: Option<Sensor> = sqlx::query_as(
        r#"
        UPDATE sensors
        SET active_profile_id = $2, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(sensor_id)
    .bind(profile_id)
    .fetch_optional(pool)
    .await?;
    sensor.ok_or_else(|| DomainError::NotFound("Sensor not found".into()))
}

/// Whether this sensor currently participates in any non-terminal capture
/// session, via `run_sensors`. Used to forbid deletion (§3).
pub async fn has_active_capture_sessions(
    pool: &PgPool,
    project_id: Uuid,
    sensor_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let (has_active,): (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM run_sensors rs
            JOIN capture_sessions cs
              ON cs.run_id = rs.run_id AND cs.project_id = rs.project_id
            WHERE rs.project_id = $1
              AND rs.sensor_id = $2
              AND cs.status IN ('draft', 'running', 'backfilling')
        )
        "#,
    )
    .bind(project_id)
    .bind(sensor_id)
    .fetch_one(pool)
    .await?;
    Ok(has_active)
}

pub async fn delete(pool: &PgPool, project_id: Uuid, sensor_id: Uuid) -> DomainResult<()> {
    get(pool, project_id, sensor_id).await?;
    if has_active_capture_sessions(pool, project_id, sensor_id).await? {
        return Err(DomainError::Conflict(
            "Sensor has active capture sessions".into(),
        ));
    }
    delete_unchecked(pool, sensor_id).await
}

/// Whether this sensor participates in any non-terminal capture session,
/// without restricting to a single project (§6 flat `DELETE
/// /api/v1/sensors/{id}` route).
async fn has_any_active_capture_sessions(pool: &PgPool, sensor_id: Uuid) -> Result<bool, sqlx::Error> {
    let (has_active,): (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM run_sensors rs
            JOIN capture_sessions cs
              ON cs.run_id = rs.run_id AND cs.project_id = rs.project_id
            WHERE rs.sensor_id = $1
              AND cs.status IN ('draft', 'running', 'backfilling')
        )
        "#,
    )
    .bind(sensor_id)
    .fetch_one(pool)
    .await?;
    Ok(has_active)
}

pub async fn delete_by_id(pool: &PgPool, sensor_id: Uuid) -> DomainResult<()> {
    if has_any_active_capture_sessions(pool, sensor_id).await? {
        return Err(DomainError::Conflict(
            "Sensor has active capture sessions".into(),
        ));
    }
    delete_unchecked(pool, sensor_id).await
}

async fn delete_unchecked(pool: &PgPool, sensor_id: Uuid) -> DomainResult<()> {
    let result = sqlx::query("DELETE FROM sensors WHERE id = $1")
        .bind(sensor_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DomainError::NotFound("Sensor not found".into()));
    }
    Ok(())
}
