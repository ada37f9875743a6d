//! HTTP surface: router assembly and shared application state.

pub mod backfill;
pub mod capture_sessions;
pub mod conversion_profiles;
pub mod experiments;
pub mod health;
pub mod runs;
pub mod sensors;
pub mod telemetry;
pub mod webhooks;

use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::telemetry::profile_cache::ProfileCache;

/// Shared application state threaded through every handler and worker
/// (`AppContext` in the re-architecture guidance of `spec.md` §9).
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub profile_cache: Arc<ProfileCache>,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl AppState {
    #[must_use]
    pub fn new(db: PgPool, config: Config) -> Self {
        let profile_cache = Arc::new(ProfileCache::new(std::time::Duration::from_secs(
            config.profile_cache_ttl_secs,
        )));
        Self {
            db,
            config: Arc::new(config),
            profile_cache,
        }
    }
}

/// Build the application router: core telemetry/webhook routes plus the
/// minimal collaborator CRUD surface (`SPEC_FULL.md` §6).
#[must_use]
pub fn create_router(state: AppState) -> Router {
    let cors = match &state.config.cors_origins {
        Some(origins) if !origins.is_empty() => {
            let headers: Vec<_> = origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(headers)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        _ => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    Router::new()
        .route("/health", get(health::health))
        .route("/api/v1/telemetry", post(telemetry::ingest))
        .route("/api/v1/sensors", post(sensors::create))
        .route("/api/v1/sensors/{id}", get(sensors::get).delete(sensors::delete))
        .route("/api/v1/sensors/{id}/token:rotate", post(sensors::rotate_token))
        .route(
            "/api/v1/sensors/{id}/conversion-profiles",
            post(conversion_profiles::create).get(conversion_profiles::list_by_sensor),
        )
        .route(
            "/api/v1/conversion-profiles/{id}",
            get(conversion_profiles::get),
        )
        .route(
            "/api/v1/conversion-profiles/{id}:publish",
            post(conversion_profiles::publish),
        )
        .route("/api/v1/projects/{project_id}/sensors", get(sensors::list_by_project))
        .route("/api/v1/experiments", post(experiments::create))
        .route(
            "/api/v1/projects/{project_id}/experiments",
            get(experiments::list),
        )
        .route(
            "/api/v1/projects/{project_id}/experiments/{id}",
            get(experiments::get),
        )
        .route(
            "/api/v1/projects/{project_id}/experiments/{id}:archive",
            post(experiments::archive),
        )
        .route("/api/v1/experiments/{id}/runs", post(runs::create).get(runs::list_by_experiment))
        .route("/api/v1/runs/{id}", get(runs::get))
        .route("/api/v1/runs/{id}:transition", post(runs::update_status))
        .route(
            "/api/v1/runs/{id}/capture-sessions",
            post(capture_sessions::create).get(capture_sessions::list_by_run),
        )
        .route("/api/v1/capture-sessions/{id}", get(capture_sessions::get).delete(capture_sessions::delete))
        .route("/api/v1/capture-sessions/{id}:stop", post(capture_sessions::stop))
        .route(
            "/api/v1/capture-sessions/{id}/events",
            get(capture_sessions::list_events),
        )
        .route("/api/v1/sensors/{id}/backfill-tasks", get(backfill::list_by_sensor))
        .route("/api/v1/sensors/{id}/profile", post(sensors::set_profile))
        .route("/api/v1/backfill-tasks", post(backfill::create))
        .route("/api/v1/backfill-tasks/{id}", get(backfill::get))
        .route("/api/v1/webhooks", post(webhooks::create).get(webhooks::list))
        .route(
            "/api/v1/webhooks/{id}",
            get(webhooks::get).patch(webhooks::update).delete(webhooks::delete),
        )
        .route("/api/v1/webhooks/deliveries", get(webhooks::list_deliveries))
        .route(
            "/api/v1/webhooks/deliveries/{id}:retry",
            post(webhooks::retry_delivery),
        )
        .merge(api_docs(state.config.enable_api_docs))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Swagger UI at `/api/docs`, gated by `Config::enable_api_docs`.
fn api_docs(enable: bool) -> Router<AppState> {
    if !enable {
        return Router::new();
    }
    Router::new().merge(
        SwaggerUi::new("/api/docs").url("/api/docs/openapi.json", crate::openapi::ApiDoc::openapi()),
    )
}
