//! Profile Cache
//!
//! Per-process `sensor_id -> active conversion profile` cache with a TTL,
//! used by the Ingest Service to avoid a database round-trip per reading
//! batch. Uses the same `DashMap` + per-key generation counter pattern as
//! other process-local caches in this codebase, extended with an explicit
//! per-entry expiry since the profile cache must honor a wall-clock
//! consistency contract (§4.2: a reading is tagged with a profile that was
//! active no more than TTL seconds before ingest time).
//!
//! `invalidate(sensor_id)` gives synchronous same-process coherency when a
//! profile is published; cross-process coherency is eventual via the TTL.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

/// A loaded active profile, or the confirmed absence of one.
#[derive(Debug, Clone)]
pub struct ActiveProfile {
    pub profile_id: Uuid,
    pub kind: String,
    pub payload: Value,
}

#[derive(Clone)]
struct CacheEntry {
    profile: Option<ActiveProfile>,
    expires_at: Instant,
    _generation: u64,
}

/// Thread-safe, TTL'd cache of per-sensor active conversion profiles.
pub struct ProfileCache {
    entries: DashMap<Uuid, CacheEntry>,
    generations: DashMap<Uuid, Arc<AtomicU64>>,
    ttl: Duration,
}

impl ProfileCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            generations: DashMap::new(),
            ttl,
        }
    }

    fn sensor_generation(&self, sensor_id: Uuid) -> Arc<AtomicU64> {
        self.generations
            .entry(sensor_id)
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }

    /// Get the active profile for a sensor, loading it from the database on
    /// a cache miss or TTL expiry. Returns `None` if the sensor currently
    /// has no active profile (a confirmed negative result, itself cached).
    #[tracing::instrument(skip(self, pool))]
    pub async fn get_active(
        &self,
        pool: &PgPool,
        sensor_id: Uuid,
    ) -> Result<Option<ActiveProfile>, sqlx::Error> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(&sensor_id) {
            if entry.expires_at > now {
                return Ok(entry.profile.clone());
            }
        }

        let gen = self.sensor_generation(sensor_id);
        let gen_before = gen.load(Ordering::Acquire);

        let row: Option<(Uuid, String, Value)> = sqlx::query_as(
            r#"
            SELECT id, kind, payload
            FROM conversion_profiles
            WHERE sensor_id = $1 AND status = 'active'
            "#,
        )
        .bind(sensor_id)
        .fetch_optional(pool)
        .await?;

        let profile = row.map(|(profile_id, kind, payload)| ActiveProfile {
            profile_id,
            kind,
            payload,
        });

        let gen_after = gen.load(Ordering::Acquire);
        if gen_before == gen_after {
            self.entries.insert(
                sensor_id,
                CacheEntry {
                    profile: profile.clone(),
                    expires_at: now + self.ttl,
                    _generation: gen_before,
                },
            );
        }

        Ok(profile)
    }

    /// Invalidate the cached entry for a sensor. Called synchronously when
    /// the active profile for that sensor changes within this process.
    pub fn invalidate(&self, sensor_id: Uuid) {
        self.sensor_generation(sensor_id)
            .fetch_add(1, Ordering::Release);
        self.entries.remove(&sensor_id);
    }
}
