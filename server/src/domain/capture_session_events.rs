//! Capture-session audit log (§4.7).
//!
//! Append-only. Every row is written in the same transaction as the
//! mutation it describes; `create_in_tx` is the only write path and takes
//! a borrowed transaction so callers in [`super::capture_sessions`]
//! cannot accidentally commit the event without the mutation (or vice
//! versa).

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::error::DomainResult;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CaptureSessionEvent {
    pub id: i64,
    pub capture_session_id: Uuid,
    pub event_type: String,
    pub actor_id: Uuid,
    pub actor_role: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

pub async fn create_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    capture_session_id: Uuid,
    event_type: &str,
    actor_id: Uuid,
    actor_role: &str,
    payload: Value,
) -> DomainResult<()> {
    sqlx::query(
        r#"
        INSERT INTO capture_session_events (capture_session_id, event_type, actor_id, actor_role, payload)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(capture_session_id)
    .bind(event_type)
    .bind(actor_id)
    .bind(actor_role)
    .bind(&payload)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Paginated, `created_at, id` ascending listing with a window-function
/// total, falling back to a separate `COUNT(*)` when the page is empty
/// (mirrors the original repository's defensive fallback).
pub async fn list_by_session(
    pool: &PgPool,
    capture_session_id: Uuid,
    limit: i64,
    offset: i64,
) -> DomainResult<(Vec<CaptureSessionEvent>, i64)> {
    #[derive(sqlx::FromRow)]
    struct Row {
        #[sqlx(flatten)]
        event: CaptureSessionEvent,
        total_count: i64,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        SELECT id, capture_session_id, event_type, actor_id, actor_role, payload, created_at,
               COUNT(*) OVER() AS total_count
        FROM capture_session_events
        WHERE capture_session_id = $1
        ORDER BY created_at ASC, id ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(capture_session_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    if let Some(first) = rows.first() {
        let total = first.total_count;
        return Ok((rows.into_iter().map(|r| r.event).collect(), total));
    }

    let (total,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM capture_session_events WHERE capture_session_id = $1")
            .bind(capture_session_id)
            .fetch_one(pool)
            .await?;
    Ok((Vec::new(), total))
}
