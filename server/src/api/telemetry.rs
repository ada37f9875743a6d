//! Telemetry ingest endpoint (§4.3, §6).

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::Json;
use validator::Validate;

use crate::telemetry::error::{IngestError, IngestResult};
use crate::telemetry::service;
use crate::telemetry::types::{IngestRequest, IngestResponse};

use super::AppState;

fn bearer_token(headers: &HeaderMap) -> IngestResult<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .ok_or(IngestError::Unauthorized)
}

/// `POST /api/v1/telemetry`: authenticate via the sensor's bearer token,
/// then hand the batch to the ingest service.
#[utoipa::path(
    post,
    path = "/api/v1/telemetry",
    tag = "telemetry",
    request_body = IngestRequest,
    responses(
        (status = 200, description = "Batch accepted", body = IngestResponse),
        (status = 401, description = "Invalid sensor token"),
        (status = 400, description = "Scope mismatch or validation error"),
    ),
    security(("sensor_bearer" = []))
)]
pub async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IngestRequest>,
) -> IngestResult<Json<IngestResponse>> {
    request
        .validate()
        .map_err(|e| IngestError::Validation(e.to_string()))?;
    if request.readings.len() > state.config.max_ingest_batch_size {
        return Err(IngestError::Validation(format!(
            "batch of {} readings exceeds the maximum of {}",
            request.readings.len(),
            state.config.max_ingest_batch_size
        )));
    }

    let token = bearer_token(&headers)?;
    let response = service::ingest(
        &state.db,
        &state.profile_cache,
        token,
        &state.config.sensor_token_pepper,
        request,
    )
    .await?;
    Ok(Json(response))
}
