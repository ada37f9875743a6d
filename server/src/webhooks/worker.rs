//! Webhook Delivery Worker (§4.6).
//!
//! Many parallel worker tasks share one `webhook_deliveries` queue.
//! Each tick claims a batch, signs and POSTs each claimed row, and
//! records the outcome with jittered exponential backoff on failure.
//! A separate sweeper task reclaims leases abandoned by a crashed
//! worker.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use super::deliveries;
use super::signing;
use super::types::WebhookDelivery;

pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub claim_batch_size: i64,
    pub request_timeout: Duration,
    pub max_attempts: i32,
    pub backoff_base: chrono::Duration,
    pub backoff_cap: chrono::Duration,
}

/// Spawn `count` parallel delivery worker tasks, each polling the shared
/// queue independently (§4.6: "Single queue, many parallel workers per
/// process").
pub fn spawn_workers(pool: PgPool, config: WorkerConfig, count: usize) -> Vec<tokio::task::JoinHandle<()>> {
    let http_client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .expect("failed to build webhook HTTP client");

    let poll_interval = config.poll_interval;
    let claim_batch_size = config.claim_batch_size;
    let max_attempts = config.max_attempts;
    let backoff_base = config.backoff_base;
    let backoff_cap = config.backoff_cap;

    (0..count.max(1))
        .map(|worker_index| {
            let pool = pool.clone();
            let client = http_client.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(poll_interval);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    run_one_tick(&pool, &client, claim_batch_size, max_attempts, backoff_base, backoff_cap, worker_index).await;
                }
            })
        })
        .collect()
}

/// Spawn the stale-lease sweeper: periodically reclaims `in_progress`
/// deliveries whose lease has expired (§4.6).
pub fn spawn_sweeper(pool: PgPool, poll_interval: Duration, lease_timeout: chrono::Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            match deliveries::reclaim_stale(&pool, lease_timeout).await {
                Ok(0) => {}
                Ok(n) => info!(count = n, "reclaimed stale webhook delivery leases"),
                Err(e) => warn!(error = %e, "failed to sweep stale webhook delivery leases"),
            }
        }
    })
}

#[tracing::instrument(skip(pool, client), fields(worker = worker_index))]
async fn run_one_tick(
    pool: &PgPool,
    client: &reqwest::Client,
    claim_batch_size: i64,
    max_attempts: i32,
    backoff_base: chrono::Duration,
    backoff_cap: chrono::Duration,
    worker_index: usize,
) {
    let claimed = match deliveries::claim_due_pending(pool, claim_batch_size).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, "failed to claim webhook deliveries");
            return;
        }
    };

    for delivery in claimed {
        deliver_one(pool, client, delivery, max_attempts, backoff_base, backoff_cap).await;
    }
}

async fn deliver_one(
    pool: &PgPool,
    client: &reqwest::Client,
    delivery: WebhookDelivery,
    max_attempts: i32,
    backoff_base: chrono::Duration,
    backoff_cap: chrono::Duration,
) {
    let body_bytes = delivery.request_body.to_string().into_bytes();

    let mut request = client
        .post(&delivery.target_url)
        .header("Content-Type", "application/json")
        .header("X-Webhook-Event", &delivery.event_type)
        .header("X-Webhook-Delivery-Id", delivery.id.to_string());

    if let Some(secret) = &delivery.secret {
        let signature = signing::sign_payload(secret, &body_bytes);
        request = request.header("X-Webhook-Signature", format!("sha256={signature}"));
    }

    let result = request.body(body_bytes).send().await;

    match result {
        Ok(response) if response.status().is_success() => {
            if let Err(e) = deliveries::mark_attempt(pool, delivery.id, "succeeded", None, None).await {
                warn!(delivery_id = %delivery.id, error = %e, "failed to record successful delivery");
            }
        }
        Ok(response) => {
            let status = response.status().as_u16();
            handle_failure(pool, delivery, max_attempts, backoff_base, backoff_cap, &format!("HTTP {status}")).await;
        }
        Err(e) => {
            handle_failure(pool, delivery, max_attempts, backoff_base, backoff_cap, &e.to_string()).await;
        }
    }
}

async fn handle_failure(
    pool: &PgPool,
    delivery: WebhookDelivery,
    max_attempts: i32,
    backoff_base: chrono::Duration,
    backoff_cap: chrono::Duration,
    error: &str,
) {
    let (status, next_attempt_at) = if delivery.attempt_count >= max_attempts {
        ("failed", None)
    } else {
        (
            "pending",
            Some(Utc::now() + backoff_delay(delivery.attempt_count, backoff_base, backoff_cap)),
        )
    };

    warn!(
        delivery_id = %delivery.id,
        attempt = delivery.attempt_count,
        status,
        error,
        "webhook delivery attempt failed"
    );

    if let Err(e) = deliveries::mark_attempt(pool, delivery.id, status, Some(error), next_attempt_at).await {
        warn!(delivery_id = %delivery.id, error = %e, "failed to record failed delivery attempt");
    }
}

/// Jittered exponential backoff (§4.6): `base * 2^(attempt-1) + rand[0,
/// base)`, capped at `backoff_cap`.
fn backoff_delay(attempt_count: i32, base: chrono::Duration, cap: chrono::Duration) -> chrono::Duration {
    let attempt = attempt_count.max(1) as u32;
    let base_secs = base.num_seconds().max(1) as f64;
    let exponential = base_secs * 2f64.powi(attempt as i32 - 1);
    let jitter: f64 = rand::thread_rng().gen_range(0.0..base_secs);
    let total_secs = (exponential + jitter).min(cap.num_seconds() as f64);
    chrono::Duration::seconds(total_secs as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_grows_and_respects_cap() {
        let base = chrono::Duration::seconds(10);
        let cap = chrono::Duration::seconds(3600);
        let first = backoff_delay(1, base, cap);
        let later = backoff_delay(6, base, cap);
        assert!(first.num_seconds() >= 10 && first.num_seconds() < 20);
        assert!(later.num_seconds() <= 3600);
    }

    #[test]
    fn backoff_delay_never_exceeds_cap_even_for_huge_attempts() {
        let base = chrono::Duration::seconds(10);
        let cap = chrono::Duration::seconds(3600);
        let delay = backoff_delay(30, base, cap);
        assert_eq!(delay.num_seconds(), 3600);
    }
}
