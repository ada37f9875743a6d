//! Event Emitter (§4.5).
//!
//! A thin layer invoked after successful domain mutations (run started,
//! capture session created/stopped, profile published, backfill
//! completed, subscription created). Resolves affected subscriptions,
//! builds the request body, computes the dedup key, and enqueues.

use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use super::deliveries;
use super::subscriptions;
use super::types::{DomainEvent, EnqueueDelivery, WebhookDelivery};

/// `short_hash(payload)` (§4.5 step 3, GLOSSARY "Dedup key"): first 16 hex
/// chars of the SHA-256 digest of the payload's canonical JSON encoding.
/// Short enough to keep `dedup_key` readable, long enough that two
/// distinct payloads colliding is not a practical concern.
#[must_use]
pub fn short_hash(payload: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Emit a domain event: enqueue one delivery per active subscription
/// listening for `event.event_type` in `event.project_id` (§4.5).
/// Returns the resulting delivery rows (already-existing rows, on a
/// dedup hit, are included unchanged).
pub async fn emit(pool: &PgPool, event: &DomainEvent) -> Result<Vec<WebhookDelivery>, sqlx::Error> {
    let subs = subscriptions::list_active_for_event(pool, event.project_id, &event.event_type).await?;
    if subs.is_empty() {
        return Ok(Vec::new());
    }

    let occurred_at = Utc::now();
    let request_body = json!({
        "event_type": event.event_type,
        "occurred_at": occurred_at.to_rfc3339(),
        "payload": event.payload,
    });
    let hash = short_hash(&event.payload);

    let mut deliveries = Vec::with_capacity(subs.len());
    for sub in subs {
        let dedup_key = format!("{}:{}:{}", sub.id, event.event_type, hash);
        let delivery = deliveries::enqueue(
            pool,
            EnqueueDelivery {
                subscription_id: sub.id,
                project_id: sub.project_id,
                event_type: event.event_type.clone(),
                target_url: sub.target_url.clone(),
                secret: sub.secret.clone(),
                request_body: request_body.clone(),
                dedup_key,
            },
        )
        .await
        .map_err(|e| match e {
            super::error::WebhookError::Database(db_err) => db_err,
            other => {
                tracing::error!(error = %other, "unexpected error enqueuing webhook delivery");
                sqlx::Error::RowNotFound
            }
        })?;
        deliveries.push(delivery);
    }

    Ok(deliveries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_hash_is_deterministic_and_sixteen_hex_chars() {
        let payload = json!({"run_id": "abc"});
        let a = short_hash(&payload);
        let b = short_hash(&payload);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn short_hash_differs_for_different_payloads() {
        assert_ne!(short_hash(&json!({"a": 1})), short_hash(&json!({"a": 2})));
    }
}
