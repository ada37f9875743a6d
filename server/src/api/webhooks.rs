//! Webhook subscription and delivery surface (§6, recovered from the
//! original Python test suite — `spec.md` §4.5/§4.6 specify the engine
//! but not its HTTP shape).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::auth::{ProjectActor, ProjectRole};
use crate::webhooks::deliveries;
use crate::webhooks::error::{WebhookError, WebhookResult};
use crate::webhooks::events::{self, DomainEvent};
use crate::webhooks::subscriptions;
use crate::webhooks::types::{
    CreateSubscription, CreateSubscriptionRequest, DeliveriesPage, UpdateSubscription,
    UpdateSubscriptionRequest, WebhookSubscription,
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ProjectScopeQuery {
    pub project_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct DeliveriesQuery {
    pub project_id: Uuid,
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[utoipa::path(
    post,
    path = "/api/v1/webhooks",
    tag = "webhooks",
    params(("project_id" = Uuid, Query, description = "Owning project id")),
    request_body = CreateSubscriptionRequest,
    responses((status = 201, description = "Subscription created", body = WebhookSubscription)),
)]
pub async fn create(
    State(state): State<AppState>,
    actor: ProjectActor,
    Query(scope): Query<ProjectScopeQuery>,
    Json(request): Json<CreateSubscriptionRequest>,
) -> WebhookResult<(StatusCode, Json<WebhookSubscription>)> {
    actor
        .require_at_least(ProjectRole::Editor)
        .map_err(|_| WebhookError::Validation("insufficient project role".into()))?;

    let subscription = subscriptions::create(
        &state.db,
        CreateSubscription {
            project_id: scope.project_id,
            target_url: request.target_url,
            event_types: request.event_types,
            secret: request.secret,
        },
    )
    .await?;

    let _ = events::emit(
        &state.db,
        &DomainEvent {
            project_id: subscription.project_id,
            event_type: "webhook_subscription.created".to_string(),
            payload: serde_json::json!({
                "subscription_id": subscription.id,
                "target_url": subscription.target_url,
                "event_types": subscription.event_types,
            }),
        },
    )
    .await;

    Ok((StatusCode::CREATED, Json(subscription)))
}

pub async fn list(
    State(state): State<AppState>,
    Query(scope): Query<ProjectScopeQuery>,
) -> WebhookResult<Json<Vec<WebhookSubscription>>> {
    let subs = subscriptions::list_by_project(&state.db, scope.project_id).await?;
    Ok(Json(subs))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebhookResult<Json<WebhookSubscription>> {
    let subscription = subscriptions::get_by_id(&state.db, id).await?;
    Ok(Json(subscription))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateSubscriptionRequest>,
) -> WebhookResult<Json<WebhookSubscription>> {
    let subscription = subscriptions::update_by_id(
        &state.db,
        id,
        UpdateSubscription {
            target_url: request.target_url,
            event_types: request.event_types,
            active: request.active,
        },
    )
    .await?;
    Ok(Json(subscription))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<Uuid>) -> WebhookResult<StatusCode> {
    subscriptions::delete_by_id(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_deliveries(
    State(state): State<AppState>,
    Query(query): Query<DeliveriesQuery>,
) -> WebhookResult<Json<DeliveriesPage>> {
    let limit = query.limit.clamp(1, 200);
    let offset = query.offset.max(0);
    let (rows, total) = deliveries::list(
        &state.db,
        query.project_id,
        query.status.as_deref(),
        limit,
        offset,
    )
    .await?;
    Ok(Json(DeliveriesPage {
        total,
        deliveries: rows,
    }))
}

/// `POST /api/v1/webhooks/deliveries/{id}:retry` (§4.6 "Retry API").
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/deliveries/{id}:retry",
    tag = "webhooks",
    params(("id" = Uuid, Path, description = "Delivery id")),
    responses((status = 204, description = "Delivery reset for retry")),
)]
pub async fn retry_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebhookResult<StatusCode> {
    deliveries::retry(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
