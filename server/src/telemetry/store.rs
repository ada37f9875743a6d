//! Telemetry store.
//!
//! The append-only `telemetry_records` hypertable and the handful of
//! queries the ingest service, backfill worker, and tests read through.
//! Bulk insert happens as a single multi-row `INSERT` per batch (§4.3
//! step 6) so a batch either commits entirely or not at all.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::types::{PreparedReading, TelemetryRecordRow};

/// Bulk-insert a batch of prepared readings in one statement and return
/// the number of rows accepted. Callers are expected to have already
/// resolved conversion and merged `meta`; this function does no further
/// validation.
pub async fn insert_batch(
    pool: &PgPool,
    readings: &[PreparedReading],
) -> Result<usize, sqlx::Error> {
    if readings.is_empty() {
        return Ok(0);
    }

    let mut query_builder = sqlx::QueryBuilder::new(
        "INSERT INTO telemetry_records (
            sensor_id, signal, timestamp, raw_value, physical_value,
            conversion_status, conversion_profile_id, capture_session_id, meta
        ) ",
    );

    query_builder.push_values(readings, |mut row, reading| {
        row.push_bind(reading.sensor_id)
            .push_bind(&reading.signal)
            .push_bind(reading.timestamp)
            .push_bind(reading.raw_value)
            .push_bind(reading.physical_value)
            .push_bind(reading.conversion_status)
            .push_bind(reading.conversion_profile_id)
            .push_bind(reading.capture_session_id)
            .push_bind(&reading.meta);
    });

    query_builder.build().execute(pool).await?;
    Ok(readings.len())
}

/// Read back the most recent readings for a sensor, newest first. Used by
/// tests exercising the ingest -> read-back round trip (§8).
pub async fn list_recent_by_sensor(
    pool: &PgPool,
    sensor_id: Uuid,
    limit: i64,
) -> Result<Vec<TelemetryRecordRow>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT id, sensor_id, signal, timestamp, raw_value, physical_value,
               conversion_status, conversion_profile_id, capture_session_id, meta
        FROM telemetry_records
        WHERE sensor_id = $1
        ORDER BY timestamp DESC, id DESC
        LIMIT $2
        "#,
    )
    .bind(sensor_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Count records needing backfill work for a sensor against a target
/// profile id (§4.4 step 3): rows whose `conversion_profile_id` differs
/// from the task's profile, or whose status still needs conversion.
pub async fn count_needing_backfill(
    pool: &PgPool,
    sensor_id: Uuid,
    profile_id: Uuid,
) -> Result<i64, sqlx::Error> {
    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM telemetry_records
        WHERE sensor_id = $1
          AND (conversion_profile_id IS DISTINCT FROM $2
               OR conversion_status IN ('raw_only', 'conversion_failed'))
        "#,
    )
    .bind(sensor_id)
    .bind(profile_id)
    .fetch_one(pool)
    .await?;
    Ok(total)
}

/// A minimal row shape for the backfill page scan: just enough to
/// recompute `physical_value` without pulling `meta`/`signal` across the
/// wire for rows that won't change.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BackfillPageRow {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub raw_value: f64,
}

/// Fetch one page of records needing backfill, ordered by `(timestamp,
/// id)` ascending with keyset pagination past `(after_ts, after_id)`
/// (§4.4 step 4).
pub async fn page_needing_backfill(
    pool: &PgPool,
    sensor_id: Uuid,
    profile_id: Uuid,
    after_ts: DateTime<Utc>,
    after_id: i64,
    page_size: i64,
) -> Result<Vec<BackfillPageRow>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT id, timestamp, raw_value
        FROM telemetry_records
        WHERE sensor_id = $1
          AND (conversion_profile_id IS DISTINCT FROM $2
               OR conversion_status IN ('raw_only', 'conversion_failed'))
          AND (timestamp, id) > ($3, $4)
        ORDER BY timestamp ASC, id ASC
        LIMIT $5
        "#,
    )
    .bind(sensor_id)
    .bind(profile_id)
    .bind(after_ts)
    .bind(after_id)
    .bind(page_size)
    .fetch_all(pool)
    .await
}

/// One row's recomputed conversion result, applied in bulk per page.
pub struct BackfillUpdate {
    pub id: i64,
    pub physical_value: Option<f64>,
    pub conversion_status: &'static str,
}

/// Apply a page of recomputed conversions. All updates in the page commit
/// together (§4.4 step 4: "All updates in a page commit together").
pub async fn apply_backfill_page(
    pool: &PgPool,
    sensor_id: Uuid,
    profile_id: Uuid,
    updates: &[BackfillUpdate],
) -> Result<(), sqlx::Error> {
    if updates.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for update in updates {
        sqlx::query(
            r#"
            UPDATE telemetry_records
            SET physical_value = $1, conversion_status = $2, conversion_profile_id = $3
            WHERE id = $4 AND sensor_id = $5
            "#,
        )
        .bind(update.physical_value)
        .bind(update.conversion_status)
        .bind(profile_id)
        .bind(update.id)
        .bind(sensor_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Merge `reading.meta` over `batch.meta` on key conflict, preserving
/// whichever side's `__system` key is present untouched rather than
/// letting the other side's ordinary-key override semantics apply to it
/// (§4.3 step 5). The batch's `__system` wins if both set one, matching
/// "reserved keys untouched" rather than last-writer-wins.
#[must_use]
pub fn merge_meta(batch_meta: Option<&Value>, reading_meta: Option<&Value>) -> Value {
    let mut merged = batch_meta.cloned().unwrap_or_else(|| Value::Object(Default::default()));
    let batch_system = merged.get("__system").cloned();

    if let Some(reading) = reading_meta {
        if let (Some(merged_obj), Some(reading_obj)) = (merged.as_object_mut(), reading.as_object()) {
            for (key, value) in reading_obj {
                if key == "__system" {
                    continue;
                }
                merged_obj.insert(key.clone(), value.clone());
            }
        }
    }

    let system = batch_system.or_else(|| reading_meta.and_then(|r| r.get("__system").cloned()));
    if let Some(system_value) = system {
        if let Some(merged_obj) = merged.as_object_mut() {
            merged_obj.insert("__system".to_string(), system_value);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_meta_reading_overrides_batch_on_conflict() {
        let batch = json!({"location": "lab-a", "batch_only": 1});
        let reading = json!({"location": "lab-b"});
        let merged = merge_meta(Some(&batch), Some(&reading));
        assert_eq!(merged["location"], "lab-b");
        assert_eq!(merged["batch_only"], 1);
    }

    #[test]
    fn merge_meta_preserves_system_key_untouched() {
        let batch = json!({"__system": {"ingested_by": "agent-1"}});
        let reading = json!({"__system": {"late": true}, "foo": "bar"});
        let merged = merge_meta(Some(&batch), Some(&reading));
        assert_eq!(merged["__system"]["ingested_by"], "agent-1");
        assert_eq!(merged["foo"], "bar");
    }

    #[test]
    fn merge_meta_with_no_inputs_is_empty_object() {
        let merged = merge_meta(None, None);
        assert_eq!(merged, json!({}));
    }
}
