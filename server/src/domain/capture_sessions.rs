//! Capture session repository.
//!
//! Every state transition (create, stop, delete) is paired with a
//! [`super::capture_session_events`] audit row in the same transaction —
//! §4.7 is normative about this, so the repository functions here take an
//! actor and write the event themselves rather than leaving it to the
//! caller to remember.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::capture_session_events;
use super::error::{DomainError, DomainResult};

const NON_DELETABLE_STATUSES: &[&str] = &["draft", "running", "backfilling"];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CaptureSession {
    pub id: Uuid,
    pub run_id: Uuid,
    pub project_id: Uuid,
    pub ordinal_number: i32,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub initiated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct CreateCaptureSession {
    pub run_id: Uuid,
    pub project_id: Uuid,
    pub initiated_by: Uuid,
    pub actor_role: String,
}

pub async fn create(pool: &PgPool, data: CreateCaptureSession) -> DomainResult<CaptureSession> {
    let run_status: Option<(String,)> = sqlx::query_as("SELECT status FROM runs WHERE id = $1")
        .bind(data.run_id)
        .fetch_optional(pool)
        .await?;
    let (run_status,) = run_status.ok_or_else(|| DomainError::NotFound("Run not found".into()))?;
    if run_status == "succeeded" || run_status == "failed" {
        return Err(DomainError::Conflict(
            "cannot start a capture session under a terminal run".into(),
        ));
    }

    let mut tx = pool.begin().await?;

    let (next_ordinal,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(MAX(ordinal_number), 0) + 1 FROM capture_sessions WHERE run_id = $1",
    )
    .bind(data.run_id)
    .fetch_one(&mut *tx)
    .await?;

    let session: CaptureSession = sqlx::query_as(
        r#"
        INSERT INTO capture_sessions (run_id, project_id, ordinal_number, status, initiated_by, started_at)
        VALUES ($1, $2, $3, 'running', $4, now())
        RETURNING *
        "#,
    )
    .bind(data.run_id)
    .bind(data.project_id)
    .bind(next_ordinal as i32)
    .bind(data.initiated_by)
    .fetch_one(&mut *tx)
    .await?;

    write_event(
        &mut tx,
        session.id,
        "created",
        data.initiated_by,
        &data.actor_role,
        json!({"ordinal_number": session.ordinal_number}),
    )
    .await?;

    tx.commit().await?;
    Ok(session)
}

pub async fn get(pool: &PgPool, project_id: Uuid, session_id: Uuid) -> DomainResult<CaptureSession> {
    let session: Option<CaptureSession> = sqlx::query_as(
        "SELECT * FROM capture_sessions WHERE project_id = $1 AND id = $2",
    )
    .bind(project_id)
    .bind(session_id)
    .fetch_optional(pool)
    .await?;
    session.ok_or_else(|| DomainError::NotFound("Capture session not found".into()))
}

/// Fetch a capture session by id only, for ingest scope validation where
/// the project is implied by the sensor rather than supplied directly.
pub async fn get_by_id(pool: &PgPool, session_id: Uuid) -> Result<Option<CaptureSession>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM capture_sessions WHERE id = $1")
        .bind(session_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_by_run(pool: &PgPool, project_id: Uuid, run_id: Uuid) -> DomainResult<Vec<CaptureSession>> {
    let sessions: Vec<CaptureSession> = sqlx::query_as(
        r#"
        SELECT * FROM capture_sessions
        WHERE project_id = $1 AND run_id = $2
        ORDER BY ordinal_number ASC
        "#,
    )
    .bind(project_id)
    .bind(run_id)
    .fetch_all(pool)
    .await?;
    Ok(sessions)
}

/// Listing by run id alone, for the flat `GET /api/v1/runs/{id}/capture-sessions`
/// route (§6).
pub async fn list_by_run_id(pool: &PgPool, run_id: Uuid) -> DomainResult<Vec<CaptureSession>> {
    let sessions: Vec<CaptureSession> = sqlx::query_as(
        "SELECT * FROM capture_sessions WHERE run_id = $1 ORDER BY ordinal_number ASC",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;
    Ok(sessions)
}

pub async fn stop(
    pool: &PgPool,
    project_id: Uuid,
    session_id: Uuid,
    actor_id: Uuid,
    actor_role: &str,
) -> DomainResult<CaptureSession> {
    get(pool, project_id, session_id).await?;
    stop_by_id(pool, session_id, actor_id, actor_role).await
}

/// Stop a capture session by id alone, for the flat `POST
/// /api/v1/capture-sessions/{id}:stop` route (§6).
pub async fn stop_by_id(
    pool: &PgPool,
    session_id: Uuid,
    actor_id: Uuid,
    actor_role: &str,
) -> DomainResult<CaptureSession> {
    let mut tx = pool.begin().await?;

    let session: Option<CaptureSession> =
        sqlx::query_as("SELECT * FROM capture_sessions WHERE id = $1 FOR UPDATE")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?;
    let session = session.ok_or_else(|| DomainError::NotFound("Capture session not found".into()))?;

    if !matches!(session.status.as_str(), "draft" | "running") {
        return Err(DomainError::Conflict(
            "capture session is not in a stoppable state".into(),
        ));
    }

    let updated: CaptureSession = sqlx::query_as(
        r#"
        UPDATE capture_sessions
        SET status = 'succeeded', stopped_at = now(), updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(session_id)
    .fetch_one(&mut *tx)
    .await?;

    write_event(&mut tx, session_id, "stopped", actor_id, actor_role, json!({})).await?;

    tx.commit().await?;
    Ok(updated)
}

pub async fn delete(
    pool: &PgPool,
    project_id: Uuid,
    session_id: Uuid,
    actor_id: Uuid,
    actor_role: &str,
) -> DomainResult<()> {
    get(pool, project_id, session_id).await?;
    delete_by_id(pool, session_id, actor_id, actor_role).await
}

/// Delete a capture session by id alone, for the flat `DELETE
/// /api/v1/capture-sessions/{id}` route (§6).
pub async fn delete_by_id(
    pool: &PgPool,
    session_id: Uuid,
    actor_id: Uuid,
    actor_role: &str,
) -> DomainResult<()> {
    let mut tx = pool.begin().await?;

    let session: Option<CaptureSession> =
        sqlx::query_as("SELECT * FROM capture_sessions WHERE id = $1 FOR UPDATE")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?;
    let session = session.ok_or_else(|| DomainError::NotFound("Capture session not found".into()))?;

    if NON_DELETABLE_STATUSES.contains(&session.status.as_str()) {
        return Err(DomainError::Conflict(
            "capture session cannot be deleted in its current status".into(),
        ));
    }

    write_event(&mut tx, session_id, "deleted", actor_id, actor_role, json!({})).await?;

    sqlx::query("DELETE FROM capture_sessions WHERE id = $1")
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

async fn write_event(
    tx: &mut Transaction<'_, Postgres>,
    capture_session_id: Uuid,
    event_type: &str,
    actor_id: Uuid,
    actor_role: &str,
    payload: Value,
) -> DomainResult<()> {
    capture_session_events::create_in_tx(tx, capture_session_id, event_type, actor_id, actor_role, payload)
        .await
}
