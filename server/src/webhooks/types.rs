//! Webhook subscription and delivery types (§3, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct WebhookSubscription {
    pub id: Uuid,
    pub project_id: Uuid,
    pub target_url: String,
    pub event_types: Vec<String>,
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct CreateSubscription {
    pub project_id: Uuid,
    pub target_url: String,
    pub event_types: Vec<String>,
    pub secret: Option<String>,
}

pub struct UpdateSubscription {
    pub target_url: Option<String>,
    pub event_types: Option<Vec<String>>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub project_id: Uuid,
    pub event_type: String,
    pub target_url: String,
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    #[schema(value_type = Object)]
    pub request_body: Value,
    pub status: String,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub dedup_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct EnqueueDelivery {
    pub subscription_id: Uuid,
    pub project_id: Uuid,
    pub event_type: String,
    pub target_url: String,
    pub secret: Option<String>,
    pub request_body: Value,
    pub dedup_key: String,
}

/// A domain event as seen by the Event Emitter (§4.5), not yet resolved
/// to any particular subscription.
#[derive(Debug, Clone)]
pub struct DomainEvent {
    pub project_id: Uuid,
    pub event_type: String,
    pub payload: Value,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateSubscriptionRequest {
    pub target_url: String,
    pub event_types: Vec<String>,
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateSubscriptionRequest {
    pub target_url: Option<String>,
    pub event_types: Option<Vec<String>>,
    pub active: Option<bool>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DeliveriesPage {
    pub total: i64,
    pub deliveries: Vec<WebhookDelivery>,
}
