//! Backfill task repository.
//!
//! `claim_pending` is grounded directly in the original Python
//! `BackfillTaskRepository.claim_pending` (`FOR UPDATE SKIP LOCKED`
//! subquery) — translated verbatim rather than reinvented, since no
//! Rust example in this pack claims rows this way. `locked_at` is set
//! alongside `status = 'running'` so a stale-lease sweep can reclaim a
//! task abandoned by a crashed worker, resolving the open question in
//! `spec.md` §9 the way `DESIGN.md` documents.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::error::BackfillResult;
use super::types::{BackfillTask, CreateBackfillTask};

pub async fn create(pool: &PgPool, data: CreateBackfillTask) -> BackfillResult<BackfillTask> {
    let task: BackfillTask = sqlx::query_as(
        r#"
        INSERT INTO conversion_backfill_tasks
            (sensor_id, project_id, conversion_profile_id, created_by)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(data.sensor_id)
    .bind(data.project_id)
    .bind(data.conversion_profile_id)
    .bind(data.created_by)
    .fetch_one(pool)
    .await?;
    Ok(task)
}

pub async fn get(pool: &PgPool, task_id: Uuid) -> BackfillResult<BackfillTask> {
    let task: Option<BackfillTask> =
        sqlx::query_as("SELECT * FROM conversion_backfill_tasks WHERE id = $1")
            .bind(task_id)
            .fetch_optional(pool)
            .await?;
    task.ok_or_else(|| super::error::BackfillError::NotFound("Backfill task not found".into()))
}

pub async fn list_by_sensor(
    pool: &PgPool,
    sensor_id: Uuid,
    limit: i64,
    offset: i64,
) -> BackfillResult<(Vec<BackfillTask>, i64)> {
    let tasks: Vec<BackfillTask> = sqlx::query_as(
        r#"
        SELECT * FROM conversion_backfill_tasks
        WHERE sensor_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(sensor_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let (total,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM conversion_backfill_tasks WHERE sensor_id = $1")
            .bind(sensor_id)
            .fetch_one(pool)
            .await?;

    Ok((tasks, total))
}

/// Atomically pick one `pending` task ordered by `created_at` and mark it
/// `running`, under a skip-locked row lease, so at most one worker
/// cluster-wide ever processes it (§4.4 step 1, §5).
pub async fn claim_pending(pool: &PgPool) -> Result<Option<BackfillTask>, sqlx::Error> {
    sqlx::query_as(
        r#"
        UPDATE conversion_backfill_tasks
        SET status = 'running', started_at = now(), locked_at = now()
        WHERE id = (
            SELECT id FROM conversion_backfill_tasks
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING *
        "#,
    )
    .fetch_optional(pool)
    .await
}

pub async fn set_total(pool: &PgPool, task_id: Uuid, total: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE conversion_backfill_tasks SET total_records = $2 WHERE id = $1")
        .bind(task_id)
        .bind(total)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_progress(pool: &PgPool, task_id: Uuid, processed: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE conversion_backfill_tasks SET processed_records = $2 WHERE id = $1")
        .bind(task_id)
        .bind(processed)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_completed(pool: &PgPool, task_id: Uuid, processed: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE conversion_backfill_tasks
        SET status = 'completed', processed_records = $2, completed_at = now(), locked_at = NULL
        WHERE id = $1
        "#,
    )
    .bind(task_id)
    .bind(processed)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(pool: &PgPool, task_id: Uuid, error_message: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE conversion_backfill_tasks
        SET status = 'failed', error_message = $2, completed_at = now(), locked_at = NULL
        WHERE id = $1
        "#,
    )
    .bind(task_id)
    .bind(error_message)
    .execute(pool)
    .await?;
    Ok(())
}

/// Reclaim tasks stuck `running` with a `locked_at` older than
/// `threshold`, reverting them to `pending` so a live worker can re-claim
/// them (§9 open-question resolution — symmetric to the webhook stale
/// lease sweeper in §4.6). Returns the number of tasks reclaimed.
pub async fn reclaim_stale(pool: &PgPool, threshold: chrono::Duration) -> Result<u64, sqlx::Error> {
    let cutoff: DateTime<Utc> = Utc::now() - threshold;
    let result = sqlx::query(
        r#"
        UPDATE conversion_backfill_tasks
        SET status = 'pending', locked_at = NULL
        WHERE status = 'running' AND locked_at < $1
        "#,
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
