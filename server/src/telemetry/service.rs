//! Telemetry Ingest Service (§4.3).
//!
//! Orchestrates authentication, scope validation, conversion, and bulk
//! insert for one ingest batch. The whole batch commits or rolls back;
//! there is no partial success.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{runs, sensors};
use crate::domain::capture_sessions;

use super::conversion::apply_conversion;
use super::error::{IngestError, IngestResult};
use super::profile_cache::ProfileCache;
use super::store;
use super::types::{ConversionStatus, IngestRequest, IngestResponse, PreparedReading};

/// `POST /api/v1/telemetry` (§4.3, §6).
///
/// Steps, in order: authenticate the bearer token against the named
/// sensor, validate the run/capture-session scope, resolve the active
/// profile, convert every reading, merge `meta`, and bulk-insert.
#[tracing::instrument(skip(pool, cache, request, token_pepper))]
pub async fn ingest(
    pool: &PgPool,
    cache: &ProfileCache,
    token: &str,
    token_pepper: &str,
    request: IngestRequest,
) -> IngestResult<IngestResponse> {
    let token_hash = sensors::hash_token(token, token_pepper);
    let sensor = sensors::get_by_token_hash(pool, request.sensor_id, &token_hash)
        .await?
        .ok_or(IngestError::Unauthorized)?;

    validate_scope(pool, &sensor, request.run_id, request.capture_session_id).await?;

    let active_profile = cache.get_active(pool, sensor.id).await?;

    let mut prepared = Vec::with_capacity(request.readings.len());
    for reading in request.readings {
        let meta = store::merge_meta(request.meta.as_ref(), reading.meta.as_ref());

        let (physical_value, conversion_status) = match &active_profile {
            Some(profile) => match apply_conversion(&profile.kind, &profile.payload, reading.raw_value) {
                Some(value) => (Some(value), ConversionStatus::Converted),
                None => (None, ConversionStatus::ConversionFailed),
            },
            None => (None, ConversionStatus::RawOnly),
        };

        prepared.push(PreparedReading {
            sensor_id: sensor.id,
            signal: sensor.sensor_type.clone(),
            timestamp: reading.timestamp,
            raw_value: reading.raw_value,
            physical_value,
            conversion_status: conversion_status.as_str(),
            conversion_profile_id: active_profile.as_ref().map(|p| p.profile_id),
            capture_session_id: request.capture_session_id,
            meta,
        });
    }

    let accepted = store::insert_batch(pool, &prepared).await?;

    Ok(IngestResponse {
        status: "accepted",
        accepted,
    })
}

/// §4.3 step 2: scope validation. If a capture session is named, its run
/// must match the one supplied (if any) and its status must be
/// `running` or `draft`. Otherwise, if only a run is named, it must exist
/// and not be terminal.
async fn validate_scope(
    pool: &PgPool,
    sensor: &sensors::Sensor,
    run_id: Option<Uuid>,
    capture_session_id: Option<Uuid>,
) -> IngestResult<()> {
    if let Some(session_id) = capture_session_id {
        let session = capture_sessions::get_by_id(pool, session_id)
            .await?
            .ok_or_else(|| IngestError::NotFound("Capture session not found".into()))?;

        if session.project_id != sensor.project_id {
            return Err(IngestError::ScopeMismatch(
                "capture session does not belong to the sensor's project".into(),
            ));
        }
        if let Some(run_id) = run_id {
            if session.run_id != run_id {
                return Err(IngestError::ScopeMismatch(
                    "capture session does not belong to the given run".into(),
                ));
            }
        }
        if !matches!(session.status.as_str(), "draft" | "running") {
            return Err(IngestError::ScopeMismatch(
                "capture session is not accepting readings".into(),
            ));
        }
        return Ok(());
    }

    if let Some(run_id) = run_id {
        let run = runs::get(pool, run_id).await.map_err(|_| {
            IngestError::NotFound("Run not found".into())
        })?;
        if run.is_terminal() {
            return Err(IngestError::ScopeMismatch("run is terminal".into()));
        }
    }

    Ok(())
}

/// Whether a reading arrived later than the configured grace period
/// relative to now; callers tag `meta.__system.late = true` accordingly
/// before calling [`ingest`] (§4.3: "Late arrivals ... are tagged by the
/// caller; the store does not reject them").
#[must_use]
pub fn is_late(timestamp: chrono::DateTime<Utc>, grace_secs: i64) -> bool {
    (Utc::now() - timestamp).num_seconds() > grace_secs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn is_late_detects_readings_older_than_grace() {
        let old = Utc::now() - Duration::seconds(120);
        assert!(is_late(old, 30));
        assert!(!is_late(Utc::now(), 30));
    }
}
