//! Backfill task types (§3 `BackfillTask`, §4.4).

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct BackfillTask {
    pub id: Uuid,
    pub sensor_id: Uuid,
    pub project_id: Uuid,
    pub conversion_profile_id: Uuid,
    pub status: String,
    pub total_records: i64,
    pub processed_records: i64,
    pub error_message: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
}

pub struct CreateBackfillTask {
    pub sensor_id: Uuid,
    pub project_id: Uuid,
    pub conversion_profile_id: Uuid,
    pub created_by: Option<Uuid>,
}
