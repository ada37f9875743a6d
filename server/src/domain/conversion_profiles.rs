//! Conversion profile repository.
//!
//! At most one `active` profile exists per sensor at any instant (§3
//! invariant c); publishing a new one retires the previous within the
//! same transaction so the invariant never observably breaks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::error::{DomainError, DomainResult};
use crate::telemetry::conversion::{apply_conversion, ProfileKind};

#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct ConversionProfile {
    pub id: Uuid,
    pub sensor_id: Uuid,
    pub version: String,
    pub kind: String,
    #[schema(value_type = Object)]
    pub payload: Value,
    pub status: String,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub struct CreateProfile {
    pub sensor_id: Uuid,
    pub version: String,
    pub kind: String,
    pub payload: Value,
}

/// Create a draft profile. Rejects malformed payloads up front, per the
/// re-architecture guidance in `spec.md` §9 ("reject malformed payloads
/// at publish rather than per-reading") — validated here at creation
/// time against a representative probe value so obviously broken
/// payloads never make it into the table.
pub async fn create(pool: &PgPool, data: CreateProfile) -> DomainResult<ConversionProfile> {
    if ProfileKind::parse(&data.kind).is_none() {
        return Err(DomainError::Validation(format!(
            "unknown conversion profile kind: {}",
            data.kind
        )));
    }
    if apply_conversion(&data.kind, &data.payload, 0.0).is_none()
        && apply_conversion(&data.kind, &data.payload, 1.0).is_none()
    {
        return Err(DomainError::Validation(
            "conversion profile payload is malformed".into(),
        ));
    }

    let profile: ConversionProfile = sqlx::query_as(
        r#"
        INSERT INTO conversion_profiles (sensor_id, version, kind, payload, status)
        VALUES ($1, $2, $3, $4, 'draft')
        RETURNING *
        "#,
    )
    .bind(data.sensor_id)
    .bind(&data.version)
    .bind(&data.kind)
    .bind(&data.payload)
    .fetch_one(pool)
    .await?;
    Ok(profile)
}

pub async fn get(pool: &PgPool, profile_id: Uuid) -> DomainResult<ConversionProfile> {
    let profile: Option<ConversionProfile> =
        sqlx::query_as("SELECT * FROM conversion_profiles WHERE id = $1")
            .bind(profile_id)
            .fetch_optional(pool)
            .await?;
    profile.ok_or_else(|| DomainError::NotFound("Conversion profile not found".into()))
}

pub async fn list_by_sensor(pool: &PgPool, sensor_id: Uuid) -> DomainResult<Vec<ConversionProfile>> {
    let profiles: Vec<ConversionProfile> = sqlx::query_as(
        "SELECT * FROM conversion_profiles WHERE sensor_id = $1 ORDER BY created_at DESC",
    )
    .bind(sensor_id)
    .fetch_all(pool)
    .await?;
    Ok(profiles)
}

/// Publish a draft profile: retire the sensor's current active profile (if
/// any) and promote this one, within a single transaction. Returns the
/// newly active profile and whether a prior active profile existed (the
/// caller uses this to decide whether to enqueue a backfill task).
pub async fn publish(
    pool: &PgPool,
    profile_id: Uuid,
) -> DomainResult<(ConversionProfile, bool)> {
    let mut tx = pool.begin().await?;

    let profile: Option<ConversionProfile> =
        sqlx::query_as("SELECT * FROM conversion_profiles WHERE id = $1 FOR UPDATE")
            .bind(profile_id)
            .fetch_optional(&mut *tx)
            .await?;
    let profile = profile.ok_or_else(|| DomainError::NotFound("Conversion profile not found".into()))?;

    if profile.status == "retired" {
        return Err(DomainError::Conflict("profile is already retired".into()));
    }

    let had_prior_active: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM conversion_profiles WHERE sensor_id = $1 AND status = 'active' AND id != $2",
    )
    .bind(profile.sensor_id)
    .bind(profile_id)
    .fetch_optional(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE conversion_profiles SET status = 'retired', valid_to = now() WHERE sensor_id = $1 AND status = 'active' AND id != $2",
    )
    .bind(profile.sensor_id)
    .bind(profile_id)
    .execute(&mut *tx)
    .await?;

    let published: ConversionProfile = sqlx::query_as(
        "UPDATE conversion_profiles SET status = 'active', valid_from = now() WHERE id = $1 RETURNING *",
    )
    .bind(profile_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE sensors SET active_profile_id = $2, updated_at = now() WHERE id = $1")
        .bind(profile.sensor_id)
        .bind(profile_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok((published, had_prior_active.is_some()))
}
