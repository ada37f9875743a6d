//! Conversion Backfill Worker integration tests (`spec.md` §8 scenario 4
//! and the idempotence invariant).

mod helpers;

use chrono::Utc;
use serde_json::json;
use telemetry_core::backfill::store as backfill_store;
use telemetry_core::backfill::types::CreateBackfillTask;
use telemetry_core::telemetry::store;
use telemetry_core::telemetry::types::PreparedReading;
use uuid::Uuid;

use helpers::{create_test_sensor, publish_test_profile, TestApp};

async fn ingest_raw_readings(
    pool: &sqlx::PgPool,
    sensor_id: Uuid,
    profile_id: Option<Uuid>,
    count: usize,
) {
    let mut readings = Vec::with_capacity(count);
    for i in 0..count {
        readings.push(PreparedReading {
            sensor_id,
            signal: "temperature".into(),
            timestamp: Utc::now() + chrono::Duration::milliseconds(i as i64),
            raw_value: i as f64,
            physical_value: None,
            conversion_status: "raw_only",
            conversion_profile_id: profile_id,
            capture_session_id: None,
            meta: json!({}),
        });
    }
    store::insert_batch(pool, &readings)
        .await
        .expect("failed to seed telemetry rows");
}

/// Run the claim -> load -> count -> page -> complete state machine once,
/// inline, mirroring `backfill::worker::process_task` without spawning the
/// background tick loop (so the test controls exactly one pass).
async fn run_backfill_to_completion(pool: &sqlx::PgPool, page_size: i64) {
    loop {
        let task = backfill_store::claim_pending(pool)
            .await
            .expect("failed to claim backfill task");
        let Some(task) = task else { break };

        let profile: (String, serde_json::Value) = sqlx::query_as(
            "SELECT kind, payload FROM conversion_profiles WHERE id = $1",
        )
        .bind(task.conversion_profile_id)
        .fetch_one(pool)
        .await
        .expect("profile not found");

        let total = store::count_needing_backfill(pool, task.sensor_id, task.conversion_profile_id)
            .await
            .expect("failed to count backfill rows");
        backfill_store::set_total(pool, task.id, total)
            .await
            .expect("failed to set total");

        let mut processed = 0_i64;
        let mut last_ts = chrono::DateTime::<chrono::Utc>::MIN_UTC;
        let mut last_id = 0_i64;
        loop {
            let page = store::page_needing_backfill(
                pool,
                task.sensor_id,
                task.conversion_profile_id,
                last_ts,
                last_id,
                page_size,
            )
            .await
            .expect("failed to page backfill rows");
            if page.is_empty() {
                break;
            }

            let mut updates = Vec::with_capacity(page.len());
            for row in &page {
                let value = telemetry_core::telemetry::conversion::apply_conversion(
                    &profile.0,
                    &profile.1,
                    row.raw_value,
                );
                updates.push(store::BackfillUpdate {
                    id: row.id,
                    physical_value: value,
                    conversion_status: if value.is_some() {
                        "converted"
                    } else {
                        "conversion_failed"
                    },
                });
                last_ts = row.timestamp;
                last_id = row.id;
            }
            store::apply_backfill_page(pool, task.sensor_id, task.conversion_profile_id, &updates)
                .await
                .expect("failed to apply backfill page");
            processed += page.len() as i64;
            backfill_store::update_progress(pool, task.id, processed)
                .await
                .expect("failed to update progress");
            if processed >= total {
                break;
            }
        }

        backfill_store::mark_completed(pool, task.id, processed)
            .await
            .expect("failed to mark backfill task completed");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backfill_after_publish_recomputes_every_affected_row() {
    let app = TestApp::new().await;
    let project_id = Uuid::new_v4();
    let (sensor_id, _token) = create_test_sensor(&app.pool, project_id).await;

    let profile_a = publish_test_profile(
        &app.pool,
        sensor_id,
        "linear",
        json!({"a": 1.0, "b": 0.0}),
    )
    .await;
    ingest_raw_readings(&app.pool, sensor_id, Some(profile_a.id), 1000).await;

    let profile_b = publish_test_profile(
        &app.pool,
        sensor_id,
        "linear",
        json!({"a": 10.0, "b": 0.0}),
    )
    .await;

    backfill_store::create(
        &app.pool,
        CreateBackfillTask {
            sensor_id,
            project_id,
            conversion_profile_id: profile_b.id,
            created_by: None,
        },
    )
    .await
    .expect("failed to enqueue backfill task");

    run_backfill_to_completion(&app.pool, 250).await;

    let rows = store::list_recent_by_sensor(&app.pool, sensor_id, 1000)
        .await
        .expect("failed to read back rows");
    assert_eq!(rows.len(), 1000);
    for row in &rows {
        assert_eq!(row.conversion_profile_id, Some(profile_b.id));
        assert_eq!(row.physical_value, Some(10.0 * row.raw_value));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backfill_is_idempotent_across_repeated_runs() {
    let app = TestApp::new().await;
    let project_id = Uuid::new_v4();
    let (sensor_id, _token) = create_test_sensor(&app.pool, project_id).await;

    let profile = publish_test_profile(
        &app.pool,
        sensor_id,
        "polynomial",
        json!({"coefficients": [1.0, 2.0]}),
    )
    .await;
    ingest_raw_readings(&app.pool, sensor_id, None, 200).await;

    backfill_store::create(
        &app.pool,
        CreateBackfillTask {
            sensor_id,
            project_id,
            conversion_profile_id: profile.id,
            created_by: None,
        },
    )
    .await
    .expect("failed to enqueue backfill task");
    run_backfill_to_completion(&app.pool, 64).await;

    let first_pass = store::list_recent_by_sensor(&app.pool, sensor_id, 200)
        .await
        .expect("failed to read back rows after first pass");

    backfill_store::create(
        &app.pool,
        CreateBackfillTask {
            sensor_id,
            project_id,
            conversion_profile_id: profile.id,
            created_by: None,
        },
    )
    .await
    .expect("failed to enqueue second backfill task");
    run_backfill_to_completion(&app.pool, 64).await;

    let second_pass = store::list_recent_by_sensor(&app.pool, sensor_id, 200)
        .await
        .expect("failed to read back rows after second pass");

    let first: std::collections::HashMap<i64, Option<f64>> = first_pass
        .iter()
        .map(|r| (r.id, r.physical_value))
        .collect();
    for row in &second_pass {
        assert_eq!(first[&row.id], row.physical_value);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_running_task_is_reclaimed_by_sweeper() {
    let app = TestApp::new().await;
    let project_id = Uuid::new_v4();
    let (sensor_id, _token) = create_test_sensor(&app.pool, project_id).await;
    let profile = publish_test_profile(&app.pool, sensor_id, "linear", json!({"a": 1.0, "b": 0.0})).await;

    let task = backfill_store::create(
        &app.pool,
        CreateBackfillTask {
            sensor_id,
            project_id,
            conversion_profile_id: profile.id,
            created_by: None,
        },
    )
    .await
    .expect("failed to enqueue backfill task");

    backfill_store::claim_pending(&app.pool)
        .await
        .expect("failed to claim task");
    sqlx::query("UPDATE conversion_backfill_tasks SET locked_at = now() - interval '1 hour' WHERE id = $1")
        .bind(task.id)
        .execute(&app.pool)
        .await
        .expect("failed to age the lease");

    let reclaimed = backfill_store::reclaim_stale(&app.pool, chrono::Duration::seconds(300))
        .await
        .expect("failed to sweep stale leases");
    assert_eq!(reclaimed, 1);

    let reloaded = backfill_store::get(&app.pool, task.id)
        .await
        .expect("failed to reload task");
    assert_eq!(reloaded.status, "pending");
}
