//! Webhook Delivery Pipeline integration tests (`spec.md` §8 scenarios 5-6
//! and the attempt-count/dedup invariants).

mod helpers;

use axum::body::Body;
use axum::http::{Method, StatusCode};
use serde_json::json;
use telemetry_core::webhooks::deliveries;
use telemetry_core::webhooks::events::{self, short_hash};
use telemetry_core::webhooks::subscriptions;
use telemetry_core::webhooks::types::{CreateSubscription, DomainEvent, EnqueueDelivery};
use uuid::Uuid;

use helpers::{body_to_json, TestApp};

async fn create_test_subscription(
    pool: &sqlx::PgPool,
    project_id: Uuid,
    target_url: &str,
) -> telemetry_core::webhooks::types::WebhookSubscription {
    subscriptions::create(
        pool,
        CreateSubscription {
            project_id,
            target_url: target_url.to_string(),
            event_types: vec!["run.completed".to_string()],
            secret: Some("test-secret".to_string()),
        },
    )
    .await
    .expect("failed to create test subscription")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn webhook_creation_returns_subscription_with_secret_hidden() {
    let app = TestApp::new().await;
    let project_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    let body = json!({
        "target_url": "https://example.com/hook",
        "event_types": ["run.completed"],
        "secret": "shh",
    });

    let req = TestApp::request(
        Method::POST,
        &format!("/api/v1/webhooks?project_id={project_id}"),
    )
    .header("Content-Type", "application/json")
    .header("X-User-Id", user_id.to_string())
    .header("X-Project-Role", "editor")
    .body(Body::from(serde_json::to_string(&body).unwrap()))
    .unwrap();

    let resp = app.oneshot(req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let json = body_to_json(resp).await;
    assert_eq!(json["target_url"], "https://example.com/hook");
    assert!(json.get("secret").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn viewer_cannot_create_webhook() {
    let app = TestApp::new().await;
    let project_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    let body = json!({
        "target_url": "https://example.com/hook",
        "event_types": ["run.completed"],
    });

    let req = TestApp::request(
        Method::POST,
        &format!("/api/v1/webhooks?project_id={project_id}"),
    )
    .header("Content-Type", "application/json")
    .header("X-User-Id", user_id.to_string())
    .header("X-Project-Role", "viewer")
    .body(Body::from(serde_json::to_string(&body).unwrap()))
    .unwrap();

    let resp = app.oneshot(req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn emitting_the_same_event_twice_enqueues_only_one_delivery() {
    let app = TestApp::new().await;
    let project_id = Uuid::new_v4();
    let sub = create_test_subscription(&app.pool, project_id, "https://example.com/dedup").await;

    let event = DomainEvent {
        project_id,
        event_type: "run.completed".to_string(),
        payload: json!({"run_id": "11111111-1111-1111-1111-111111111111"}),
    };

    let first = events::emit(&app.pool, &event)
        .await
        .expect("failed to emit event first time");
    let second = events::emit(&app.pool, &event)
        .await
        .expect("failed to emit event second time");

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].id, second[0].id);

    let (rows, total) = deliveries::list(&app.pool, project_id, None, 50, 0)
        .await
        .expect("failed to list deliveries");
    assert_eq!(total, 1);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].subscription_id, sub.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dedup_key_is_stable_for_identical_payloads_and_varies_otherwise() {
    let project_id = Uuid::new_v4();
    let sub_id = Uuid::new_v4();
    let payload_a = json!({"run_id": "a"});
    let payload_b = json!({"run_id": "b"});

    let key_a1 = format!("{}:{}:{}", sub_id, "run.completed", short_hash(&payload_a));
    let key_a2 = format!("{}:{}:{}", sub_id, "run.completed", short_hash(&payload_a));
    let key_b = format!("{}:{}:{}", sub_id, "run.completed", short_hash(&payload_b));

    assert_eq!(key_a1, key_a2);
    assert_ne!(key_a1, key_b);
    let _ = project_id;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn enqueue_with_same_dedup_key_returns_the_existing_row() {
    let app = TestApp::new().await;
    let project_id = Uuid::new_v4();
    let sub = create_test_subscription(&app.pool, project_id, "https://example.com/dk").await;

    let enqueue = |dedup_key: String| EnqueueDelivery {
        subscription_id: sub.id,
        project_id,
        event_type: "run.completed".to_string(),
        target_url: sub.target_url.clone(),
        secret: sub.secret.clone(),
        request_body: json!({"event_type": "run.completed"}),
        dedup_key,
    };

    let first = deliveries::enqueue(&app.pool, enqueue("dedup-key-1".to_string()))
        .await
        .expect("first enqueue failed");
    let second = deliveries::enqueue(&app.pool, enqueue("dedup-key-1".to_string()))
        .await
        .expect("second enqueue failed");

    assert_eq!(first.id, second.id);

    let (_, total) = deliveries::list(&app.pool, project_id, None, 50, 0)
        .await
        .expect("failed to list deliveries");
    assert_eq!(total, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delivery_becomes_failed_after_max_attempts_then_retry_reopens_it() {
    let app = TestApp::new().await;
    let project_id = Uuid::new_v4();
    let sub = create_test_subscription(&app.pool, project_id, "https://example.com/retry").await;

    let delivery = deliveries::enqueue(
        &app.pool,
        EnqueueDelivery {
            subscription_id: sub.id,
            project_id,
            event_type: "run.completed".to_string(),
            target_url: sub.target_url.clone(),
            secret: sub.secret.clone(),
            request_body: json!({"event_type": "run.completed"}),
            dedup_key: format!("retry-{}", Uuid::new_v4()),
        },
    )
    .await
    .expect("failed to enqueue delivery");

    let max_attempts = 3;
    let mut last_attempt_count = 0;
    for _ in 0..max_attempts {
        sqlx::query("UPDATE webhook_deliveries SET next_attempt_at = now() WHERE id = $1")
            .bind(delivery.id)
            .execute(&app.pool)
            .await
            .expect("failed to make delivery due");

        let claimed = deliveries::claim_due_pending(&app.pool, 10)
            .await
            .expect("failed to claim delivery");
        let claimed = claimed
            .into_iter()
            .find(|d| d.id == delivery.id)
            .expect("delivery was not claimed");
        assert!(claimed.attempt_count > last_attempt_count);
        last_attempt_count = claimed.attempt_count;

        let status = if claimed.attempt_count >= max_attempts {
            "failed"
        } else {
            "pending"
        };
        let next_attempt_at = if status == "pending" {
            Some(chrono::Utc::now())
        } else {
            None
        };
        deliveries::mark_attempt(&app.pool, delivery.id, status, Some("HTTP 500"), next_attempt_at)
            .await
            .expect("failed to mark attempt");
    }

    let failed = deliveries::get(&app.pool, delivery.id)
        .await
        .expect("failed to reload delivery");
    assert_eq!(failed.status, "failed");
    assert_eq!(failed.attempt_count, max_attempts);

    let reopened = deliveries::retry(&app.pool, delivery.id)
        .await
        .expect("retry should succeed on a failed delivery");
    assert_eq!(reopened.status, "pending");
    assert!(reopened.next_attempt_at.unwrap() <= chrono::Utc::now());
    assert_eq!(reopened.attempt_count, max_attempts);

    sqlx::query("UPDATE webhook_deliveries SET next_attempt_at = now() WHERE id = $1")
        .bind(delivery.id)
        .execute(&app.pool)
        .await
        .expect("failed to make retried delivery due");
    let claimed_again = deliveries::claim_due_pending(&app.pool, 10)
        .await
        .expect("failed to claim retried delivery")
        .into_iter()
        .find(|d| d.id == delivery.id)
        .expect("retried delivery was not reclaimed");
    assert_eq!(claimed_again.status, "in_progress");
    assert_eq!(claimed_again.attempt_count, max_attempts + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retry_is_rejected_unless_delivery_is_failed() {
    let app = TestApp::new().await;
    let project_id = Uuid::new_v4();
    let sub = create_test_subscription(&app.pool, project_id, "https://example.com/notfailed").await;

    let delivery = deliveries::enqueue(
        &app.pool,
        EnqueueDelivery {
            subscription_id: sub.id,
            project_id,
            event_type: "run.completed".to_string(),
            target_url: sub.target_url.clone(),
            secret: sub.secret.clone(),
            request_body: json!({"event_type": "run.completed"}),
            dedup_key: format!("not-failed-{}", Uuid::new_v4()),
        },
    )
    .await
    .expect("failed to enqueue delivery");

    let result = deliveries::retry(&app.pool, delivery.id).await;
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_in_progress_delivery_is_reclaimed_to_pending() {
    let app = TestApp::new().await;
    let project_id = Uuid::new_v4();
    let sub = create_test_subscription(&app.pool, project_id, "https://example.com/sweep").await;

    let delivery = deliveries::enqueue(
        &app.pool,
        EnqueueDelivery {
            subscription_id: sub.id,
            project_id,
            event_type: "run.completed".to_string(),
            target_url: sub.target_url.clone(),
            secret: sub.secret.clone(),
            request_body: json!({"event_type": "run.completed"}),
            dedup_key: format!("sweep-{}", Uuid::new_v4()),
        },
    )
    .await
    .expect("failed to enqueue delivery");

    sqlx::query(
        "UPDATE webhook_deliveries SET status = 'in_progress', locked_at = now() - interval '1 hour' WHERE id = $1",
    )
    .bind(delivery.id)
    .execute(&app.pool)
    .await
    .expect("failed to age the lease");

    let reclaimed = deliveries::reclaim_stale(&app.pool, chrono::Duration::seconds(300))
        .await
        .expect("failed to sweep stale leases");
    assert_eq!(reclaimed, 1);

    let reloaded = deliveries::get(&app.pool, delivery.id)
        .await
        .expect("failed to reload delivery");
    assert_eq!(reloaded.status, "pending");
}
