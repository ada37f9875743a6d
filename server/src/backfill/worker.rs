//! Conversion Backfill Worker (§4.4).
//!
//! Tick-driven: claim one pending task, load its profile, count the work,
//! then iterate pages of 1 000 rows via keyset pagination until the task
//! is exhausted. Never holds a transaction open across a page boundary
//! longer than that page's own commit, so a restart between pages leaves
//! `processed_records` consistent with what actually landed.

use std::time::Duration;

use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::telemetry::conversion::apply_conversion;
use crate::telemetry::store::{apply_backfill_page, page_needing_backfill, BackfillUpdate};
use crate::webhooks::events::{self, DomainEvent};

use super::error::truncate_error;
use super::store;

/// Spawn the periodic backfill worker loop. The first tick is consumed
/// immediately so a fleet of freshly started instances doesn't all claim
/// at once on boot.
pub fn spawn(pool: PgPool, poll_interval: Duration, page_size: i64, lease_timeout: chrono::Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = store::reclaim_stale(&pool, lease_timeout).await {
                warn!(error = %e, "failed to sweep stale backfill leases");
            }
            run_one_tick(&pool, page_size).await;
        }
    })
}

/// Claim and fully process at most one pending task. Returns without
/// doing anything if the queue is empty (§4.4 step 1).
#[tracing::instrument(skip(pool))]
async fn run_one_tick(pool: &PgPool, page_size: i64) {
    let task = match store::claim_pending(pool).await {
        Ok(Some(task)) => task,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %e, "failed to claim backfill task");
            return;
        }
    };

    info!(task_id = %task.id, sensor_id = %task.sensor_id, "backfill task claimed");

    if let Err(e) = process_task(
        pool,
        task.id,
        task.project_id,
        task.sensor_id,
        task.conversion_profile_id,
        page_size,
    )
    .await
    {
        warn!(task_id = %task.id, error = %e, "backfill task failed");
        let _ = store::mark_failed(pool, task.id, &truncate_error(&e.to_string())).await;
    }
}

async fn process_task(
    pool: &PgPool,
    task_id: Uuid,
    project_id: Uuid,
    sensor_id: Uuid,
    profile_id: Uuid,
    page_size: i64,
) -> Result<(), sqlx::Error> {
    let profile: Option<(String, serde_json::Value)> =
        sqlx::query_as("SELECT kind, payload FROM conversion_profiles WHERE id = $1")
            .bind(profile_id)
            .fetch_optional(pool)
            .await?;
    let Some((kind, payload)) = profile else {
        store::mark_failed(pool, task_id, "Conversion profile not found").await?;
        return Ok(());
    };

    let total = crate::telemetry::store::count_needing_backfill(pool, sensor_id, profile_id).await?;
    store::set_total(pool, task_id, total).await?;

    if total == 0 {
        store::mark_completed(pool, task_id, 0).await?;
        emit_completed(pool, task_id, project_id, sensor_id, profile_id, 0).await;
        return Ok(());
    }

    let mut processed = 0_i64;
    let mut last_ts = chrono::DateTime::<chrono::Utc>::MIN_UTC;
    let mut last_id = 0_i64;

    loop {
        let page = page_needing_backfill(pool, sensor_id, profile_id, last_ts, last_id, page_size).await?;
        if page.is_empty() {
            break;
        }

        let mut updates = Vec::with_capacity(page.len());
        for row in &page {
            let result = apply_conversion(&kind, &payload, row.raw_value);
            updates.push(match result {
                Some(value) => BackfillUpdate {
                    id: row.id,
                    physical_value: Some(value),
                    conversion_status: "converted",
                },
                None => BackfillUpdate {
                    id: row.id,
                    physical_value: None,
                    conversion_status: "conversion_failed",
                },
            });
            last_ts = row.timestamp;
            last_id = row.id;
        }

        apply_backfill_page(pool, sensor_id, profile_id, &updates).await?;

        processed += page.len() as i64;
        store::update_progress(pool, task_id, processed).await?;

        if processed >= total {
            break;
        }
    }

    store::mark_completed(pool, task_id, processed).await?;
    info!(task_id = %task_id, processed, "backfill task completed");
    emit_completed(pool, task_id, project_id, sensor_id, profile_id, processed).await;
    Ok(())
}

/// Emit the `backfill.completed` domain event (§4.5: "backfill completed"
/// is one of the mutations the Event Emitter fires on). Mirrors the
/// other emit sites' fire-and-log-on-failure handling: a delivery
/// enqueue failure must not flip an otherwise-completed task to failed.
async fn emit_completed(
    pool: &PgPool,
    task_id: Uuid,
    project_id: Uuid,
    sensor_id: Uuid,
    profile_id: Uuid,
    processed_records: i64,
) {
    let result = events::emit(
        pool,
        &DomainEvent {
            project_id,
            event_type: "backfill.completed".to_string(),
            payload: json!({
                "backfill_task_id": task_id,
                "sensor_id": sensor_id,
                "conversion_profile_id": profile_id,
                "processed_records": processed_records,
            }),
        },
    )
    .await;

    if let Err(e) = result {
        warn!(task_id = %task_id, error = %e, "failed to emit backfill.completed event");
    }
}
