//! Wire types for the telemetry ingest surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

/// One reading within an ingest batch.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct ReadingInput {
    pub timestamp: DateTime<Utc>,
    pub raw_value: f64,
    pub physical_value: Option<f64>,
    #[schema(value_type = Option<Object>)]
    pub meta: Option<Value>,
}

/// `POST /api/v1/telemetry` request body.
#[derive(Debug, Clone, Deserialize, Validate, utoipa::ToSchema)]
pub struct IngestRequest {
    pub sensor_id: Uuid,
    pub run_id: Option<Uuid>,
    pub capture_session_id: Option<Uuid>,
    #[schema(value_type = Option<Object>)]
    pub meta: Option<Value>,
    #[validate(length(min = 1, max = 10000))]
    pub readings: Vec<ReadingInput>,
}

/// `POST /api/v1/telemetry` response body.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct IngestResponse {
    pub status: &'static str,
    pub accepted: usize,
}

/// The conversion_status taxonomy stored on each telemetry row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStatus {
    Converted,
    RawOnly,
    ConversionFailed,
}

impl ConversionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Converted => "converted",
            Self::RawOnly => "raw_only",
            Self::ConversionFailed => "conversion_failed",
        }
    }
}

/// A fully resolved row ready for bulk insert into `telemetry_records`.
#[derive(Debug, Clone)]
pub struct PreparedReading {
    pub sensor_id: Uuid,
    pub signal: String,
    pub timestamp: DateTime<Utc>,
    pub raw_value: f64,
    pub physical_value: Option<f64>,
    pub conversion_status: &'static str,
    pub conversion_profile_id: Option<Uuid>,
    pub capture_session_id: Option<Uuid>,
    pub meta: Value,
}

/// A row read back from `telemetry_records`, used by tests and the
/// backfill worker's count/page queries.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TelemetryRecordRow {
    pub id: i64,
    pub sensor_id: Uuid,
    pub signal: String,
    pub timestamp: DateTime<Utc>,
    pub raw_value: f64,
    pub physical_value: Option<f64>,
    pub conversion_status: String,
    pub conversion_profile_id: Option<Uuid>,
    pub capture_session_id: Option<Uuid>,
    pub meta: Value,
}
