//! Reusable test helpers for HTTP integration tests.
//!
//! Provides `TestApp` for building and sending requests through the full
//! axum router, plus fixture builders for sensors, conversion profiles,
//! experiments, runs and capture sessions, following the teacher's own
//! `tests/helpers` shape.

use axum::{
    body::Body,
    http::{self, Method, Request, Response},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::PgPool;
use telemetry_core::api::{create_router, AppState};
use telemetry_core::config::Config;
use telemetry_core::db;
use telemetry_core::domain::{conversion_profiles, experiments, runs, sensors};
use uuid::Uuid;

/// A test application wrapping the full axum router.
pub struct TestApp {
    pub router: Router,
    pub pool: PgPool,
}

impl TestApp {
    /// Create a new test app against the local test Postgres instance
    /// documented in `Config::default_for_test`.
    pub async fn new() -> Self {
        let config = Config::default_for_test();
        let pool = db::create_pool(&config.database_url, config.database_max_connections)
            .await
            .expect("failed to connect to test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let state = AppState::new(pool.clone(), config);
        let router = create_router(state);

        Self { router, pool }
    }

    /// Build an HTTP request with the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }

    /// Build a JSON request with owner-level project actor headers set.
    pub fn owner_request(method: Method, uri: &str, user_id: Uuid, body: Value) -> Request<Body> {
        Self::request(method, uri)
            .header("Content-Type", "application/json")
            .header("X-User-Id", user_id.to_string())
            .header("X-Project-Role", "owner")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    }
}

/// Collect a response body and parse it as JSON.
pub async fn body_to_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("failed to collect response body")
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        let preview = String::from_utf8_lossy(&bytes);
        panic!("failed to parse response as JSON: {e}\nBody: {preview}")
    })
}

/// Create a sensor directly against the domain layer (bypassing HTTP),
/// returning `(sensor_id, plaintext_token)`.
pub async fn create_test_sensor(pool: &PgPool, project_id: Uuid) -> (Uuid, String) {
    let (token, preview) = sensors::generate_token();
    let token_hash = sensors::hash_token(&token, "test-pepper");
    let sensor = sensors::create(
        pool,
        sensors::CreateSensor {
            project_id,
            name: format!("sensor-{}", Uuid::new_v4()),
            sensor_type: "temperature".into(),
            input_unit: "raw".into(),
            display_unit: "celsius".into(),
            calibration_notes: None,
        },
        &token_hash,
        &preview,
    )
    .await
    .expect("failed to create test sensor");
    (sensor.id, token)
}

/// Create and publish a conversion profile for a sensor, returning the
/// published profile.
pub async fn publish_test_profile(
    pool: &PgPool,
    sensor_id: Uuid,
    kind: &str,
    payload: Value,
) -> conversion_profiles::ConversionProfile {
    let profile = conversion_profiles::create(
        pool,
        conversion_profiles::CreateProfile {
            sensor_id,
            version: "v1".into(),
            kind: kind.into(),
            payload,
        },
    )
    .await
    .expect("failed to create test profile");

    let (published, _) = conversion_profiles::publish(pool, profile.id)
        .await
        .expect("failed to publish test profile");
    sensors::set_active_profile(pool, sensor_id, Some(published.id))
        .await
        .expect("failed to set active profile");
    published
}

/// Create an experiment + draft run for a project, returning the run.
pub async fn create_test_run(pool: &PgPool, project_id: Uuid, owner_id: Uuid) -> runs::Run {
    let experiment = experiments::create(
        pool,
        experiments::CreateExperiment {
            project_id,
            owner_id,
            name: format!("experiment-{}", Uuid::new_v4()),
            tags: vec![],
            metadata: json!({}),
        },
    )
    .await
    .expect("failed to create test experiment");

    runs::create(
        pool,
        runs::CreateRun {
            experiment_id: experiment.id,
            project_id,
            params: json!({}),
            git_sha: None,
            env: None,
            sensor_ids: vec![],
        },
    )
    .await
    .expect("failed to create test run")
}
