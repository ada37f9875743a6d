//! OpenAPI document aggregation.
//!
//! Collects the `#[utoipa::path]`-annotated handlers and `ToSchema` types
//! across the crate into a single spec, served by `SwaggerUi` at
//! `/api/docs` when `Config::enable_api_docs` is set.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::health::health,
        crate::api::telemetry::ingest,
        crate::api::sensors::create,
        crate::api::conversion_profiles::create,
        crate::api::conversion_profiles::publish,
        crate::api::backfill::create,
        crate::api::webhooks::create,
        crate::api::webhooks::retry_delivery,
    ),
    components(schemas(
        crate::api::health::HealthResponse,
        crate::telemetry::types::ReadingInput,
        crate::telemetry::types::IngestRequest,
        crate::telemetry::types::IngestResponse,
        crate::api::sensors::CreateSensorRequest,
        crate::api::sensors::CreateSensorResponse,
        crate::domain::sensors::Sensor,
        crate::api::conversion_profiles::CreateProfileRequest,
        crate::api::conversion_profiles::PublishResponse,
        crate::domain::conversion_profiles::ConversionProfile,
        crate::api::backfill::CreateBackfillTaskRequest,
        crate::backfill::types::BackfillTask,
        crate::webhooks::types::WebhookSubscription,
        crate::webhooks::types::CreateSubscriptionRequest,
        crate::webhooks::types::UpdateSubscriptionRequest,
        crate::webhooks::types::WebhookDelivery,
        crate::webhooks::types::DeliveriesPage,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "telemetry", description = "Telemetry ingest"),
        (name = "sensors", description = "Sensor collaborator CRUD"),
        (name = "conversion-profiles", description = "Conversion profile lifecycle"),
        (name = "backfill", description = "Conversion backfill tasks"),
        (name = "webhooks", description = "Webhook subscriptions and deliveries"),
    ),
)]
pub struct ApiDoc;
