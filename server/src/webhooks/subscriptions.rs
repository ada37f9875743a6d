//! Webhook subscription repository (§3 `WebhookSubscription`).

use sqlx::PgPool;
use uuid::Uuid;

use super::error::{WebhookError, WebhookResult};
use super::types::{CreateSubscription, UpdateSubscription, WebhookSubscription};

pub async fn create(pool: &PgPool, data: CreateSubscription) -> WebhookResult<WebhookSubscription> {
    if data.event_types.is_empty() {
        return Err(WebhookError::Validation(
            "at least one event type is required".into(),
        ));
    }
    let subscription: WebhookSubscription = sqlx::query_as(
        r#"
        INSERT INTO webhook_subscriptions (project_id, target_url, event_types, secret, active)
        VALUES ($1, $2, $3, $4, true)
        RETURNING *
        "#,
    )
    .bind(data.project_id)
    .bind(&data.target_url)
    .bind(&data.event_types)
    .bind(&data.secret)
    .fetch_one(pool)
    .await?;
    Ok(subscription)
}

pub async fn get(pool: &PgPool, project_id: Uuid, id: Uuid) -> WebhookResult<WebhookSubscription> {
    let subscription: Option<WebhookSubscription> = sqlx::query_as(
        "SELECT * FROM webhook_subscriptions WHERE project_id = $1 AND id = $2",
    )
    .bind(project_id)
    .bind(id)
    .fetch_optional(pool)
    .await?;
    subscription.ok_or_else(|| WebhookError::NotFound("Webhook subscription not found".into()))
}

pub async fn list_by_project(pool: &PgPool, project_id: Uuid) -> WebhookResult<Vec<WebhookSubscription>> {
    let subscriptions: Vec<WebhookSubscription> = sqlx::query_as(
        "SELECT * FROM webhook_subscriptions WHERE project_id = $1 ORDER BY created_at DESC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(subscriptions)
}

/// Active subscriptions for a project that are listening for the given
/// event type — used by the Event Emitter (§4.5 step 1).
pub async fn list_active_for_event(
    pool: &PgPool,
    project_id: Uuid,
    event_type: &str,
) -> Result<Vec<WebhookSubscription>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT * FROM webhook_subscriptions
        WHERE project_id = $1 AND active = true AND $2 = ANY(event_types)
        "#,
    )
    .bind(project_id)
    .bind(event_type)
    .fetch_all(pool)
    .await
}

pub async fn update(
    pool: &PgPool,
    project_id: Uuid,
    id: Uuid,
    data: UpdateSubscription,
) -> WebhookResult<WebhookSubscription> {
    let current = get(pool, project_id, id).await?;
    let target_url = data.target_url.unwrap_or(current.target_url);
    let event_types = data.event_types.unwrap_or(current.event_types);
    let active = data.active.unwrap_or(current.active);

    if event_types.is_empty() {
        return Err(WebhookError::Validation(
            "at least one event type is required".into(),
        ));
    }

    let subscription: Option<WebhookSubscription> = sqlx::query_as(
        r#"
        UPDATE webhook_subscriptions
        SET target_url = $3, event_types = $4, active = $5, updated_at = now()
        WHERE project_id = $1 AND id = $2
        RETURNING *
        "#,
    )
    .bind(project_id)
    .bind(id)
    .bind(&target_url)
    .bind(&event_types)
    .bind(active)
    .fetch_optional(pool)
    .await?;
    subscription.ok_or_else(|| WebhookError::NotFound("Webhook subscription not found".into()))
}

pub async fn delete(pool: &PgPool, project_id: Uuid, id: Uuid) -> WebhookResult<()> {
    let result = sqlx::query("DELETE FROM webhook_subscriptions WHERE project_id = $1 AND id = $2")
        .bind(project_id)
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(WebhookError::NotFound("Webhook subscription not found".into()));
    }
    Ok(())
}

/// Fetch by id alone, for the flat `GET /api/v1/webhooks/{id}` surface
/// where the caller's project is not part of the path (§6).
pub async fn get_by_id(pool: &PgPool, id: Uuid) -> WebhookResult<WebhookSubscription> {
    let subscription: Option<WebhookSubscription> =
        sqlx::query_as("SELECT * FROM webhook_subscriptions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    subscription.ok_or_else(|| WebhookError::NotFound("Webhook subscription not found".into()))
}

pub async fn update_by_id(
    pool: &PgPool,
    id: Uuid,
    data: UpdateSubscription,
) -> WebhookResult<WebhookSubscription> {
    let current = get_by_id(pool, id).await?;
    update(pool, current.project_id, id, data).await
}

pub async fn delete_by_id(pool: &PgPool, id: Uuid) -> WebhookResult<()> {
    let current = get_by_id(pool, id).await?;
    delete(pool, current.project_id, id).await
}
