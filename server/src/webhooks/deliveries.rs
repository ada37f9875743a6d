//! Webhook delivery queue repository (§3 `WebhookDelivery`, §4.6).
//!
//! The queue lives in `webhook_deliveries` rather than a Redis list
//! (unlike the teacher's `webhooks/delivery.rs`) because the spec
//! requires relational `FOR UPDATE SKIP LOCKED` claim semantics and a
//! `dedup_key` unique constraint a Redis `BRPOP` list cannot express
//! (see `DESIGN.md`).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::error::WebhookResult;
use super::types::{EnqueueDelivery, WebhookDelivery};

/// Enqueue a delivery, returning the existing row unchanged if one with
/// the same `dedup_key` already exists (§4.5 step 4, §8 scenario 5).
pub async fn enqueue(pool: &PgPool, data: EnqueueDelivery) -> WebhookResult<WebhookDelivery> {
    let delivery: WebhookDelivery = sqlx::query_as(
        r#"
        INSERT INTO webhook_deliveries (
            subscription_id, project_id, event_type, target_url, secret,
            request_body, status, attempt_count, next_attempt_at, dedup_key
        )
        VALUES ($1, $2, $3, $4, $5, $6, 'pending', 0, now(), $7)
        ON CONFLICT (dedup_key) DO UPDATE SET dedup_key = EXCLUDED.dedup_key
        RETURNING *
        "#,
    )
    .bind(data.subscription_id)
    .bind(data.project_id)
    .bind(&data.event_type)
    .bind(&data.target_url)
    .bind(&data.secret)
    .bind(&data.request_body)
    .bind(&data.dedup_key)
    .fetch_one(pool)
    .await?;
    Ok(delivery)
}

pub async fn get(pool: &PgPool, id: Uuid) -> WebhookResult<WebhookDelivery> {
    let delivery: Option<WebhookDelivery> =
        sqlx::query_as("SELECT * FROM webhook_deliveries WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    delivery.ok_or_else(|| super::error::WebhookError::NotFound("Delivery not found".into()))
}

pub async fn list(
    pool: &PgPool,
    project_id: Uuid,
    status: Option<&str>,
    limit: i64,
    offset: i64,
) -> WebhookResult<(Vec<WebhookDelivery>, i64)> {
    let deliveries: Vec<WebhookDelivery> = sqlx::query_as(
        r#"
        SELECT * FROM webhook_deliveries
        WHERE project_id = $1 AND ($2::text IS NULL OR status = $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(project_id)
    .bind(status)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM webhook_deliveries WHERE project_id = $1 AND ($2::text IS NULL OR status = $2)",
    )
    .bind(project_id)
    .bind(status)
    .fetch_one(pool)
    .await?;

    Ok((deliveries, total))
}

/// Atomically claim up to `limit` due-pending deliveries (§4.6): select
/// under `FOR UPDATE SKIP LOCKED`, then flip them to `in_progress` and
/// bump `attempt_count`, all in one statement via a CTE so no other
/// worker can observe the intermediate state.
pub async fn claim_due_pending(pool: &PgPool, limit: i64) -> Result<Vec<WebhookDelivery>, sqlx::Error> {
    sqlx::query_as(
        r#"
        WITH claimed AS (
            SELECT id FROM webhook_deliveries
            WHERE status = 'pending' AND next_attempt_at <= now()
            ORDER BY next_attempt_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        UPDATE webhook_deliveries d
        SET status = 'in_progress', locked_at = now(), attempt_count = d.attempt_count + 1, updated_at = now()
        FROM claimed
        WHERE d.id = claimed.id
        RETURNING d.*
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Record the outcome of a delivery attempt (§4.6): success marks
/// `succeeded`; failure either re-schedules as `pending` with a backoff
/// `next_attempt_at`, or marks `failed` (terminal) once `attempt_count`
/// reaches the configured max.
pub async fn mark_attempt(
    pool: &PgPool,
    id: Uuid,
    status: &str,
    last_error: Option<&str>,
    next_attempt_at: Option<DateTime<Utc>>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE webhook_deliveries
        SET status = $2, last_error = $3, next_attempt_at = $4, locked_at = NULL, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(last_error)
    .bind(next_attempt_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// `POST /api/v1/webhooks/deliveries/{id}:retry` (§4.6 "Retry API"):
/// reset a `failed` delivery to `pending`, due immediately, leaving
/// `attempt_count` intact so it is not forgotten across the retry.
pub async fn retry(pool: &PgPool, id: Uuid) -> WebhookResult<WebhookDelivery> {
    let delivery: Option<WebhookDelivery> = sqlx::query_as(
        r#"
        UPDATE webhook_deliveries
        SET status = 'pending', next_attempt_at = now(), locked_at = NULL, updated_at = now()
        WHERE id = $1 AND status = 'failed'
        RETURNING *
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    delivery.ok_or_else(|| super::error::WebhookError::Conflict(
        "delivery is not in a retryable (failed) state".into(),
    ))
}

/// Reclaim deliveries stuck `in_progress` longer than `threshold`,
/// reverting them to `pending` so another worker can pick them up
/// (§4.6 "stale-lease sweeper"). Returns the number reclaimed.
pub async fn reclaim_stale(pool: &PgPool, threshold: chrono::Duration) -> Result<u64, sqlx::Error> {
    let cutoff: DateTime<Utc> = Utc::now() - threshold;
    let result = sqlx::query(
        r#"
        UPDATE webhook_deliveries
        SET status = 'pending', locked_at = NULL, next_attempt_at = now(), updated_at = now()
        WHERE status = 'in_progress' AND locked_at < $1
        "#,
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
