//! Telemetry Ingest Service integration tests (`spec.md` §8 scenarios 1-3).

mod helpers;

use axum::body::Body;
use axum::http::{Method, StatusCode};
use chrono::Utc;
use serde_json::json;
use telemetry_core::telemetry::store;
use uuid::Uuid;

use helpers::{body_to_json, create_test_sensor, publish_test_profile, TestApp};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn linear_convert_produces_physical_value() {
    let app = TestApp::new().await;
    let project_id = Uuid::new_v4();
    let (sensor_id, token) = create_test_sensor(&app.pool, project_id).await;
    publish_test_profile(&app.pool, sensor_id, "linear", json!({"a": 2.0, "b": 1.0})).await;

    let body = json!({
        "sensor_id": sensor_id,
        "readings": [
            {"timestamp": Utc::now().to_rfc3339(), "raw_value": 3.0}
        ]
    });

    let req = TestApp::request(Method::POST, "/api/v1/telemetry")
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap();

    let resp = app.oneshot(req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_to_json(resp).await;
    assert_eq!(json["accepted"], 1);

    let rows = store::list_recent_by_sensor(&app.pool, sensor_id, 1)
        .await
        .expect("failed to read back telemetry row");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].physical_value, Some(7.0));
    assert_eq!(rows[0].conversion_status, "converted");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ingest_without_active_profile_is_raw_only() {
    let app = TestApp::new().await;
    let project_id = Uuid::new_v4();
    let (sensor_id, token) = create_test_sensor(&app.pool, project_id).await;

    let body = json!({
        "sensor_id": sensor_id,
        "readings": [
            {"timestamp": Utc::now().to_rfc3339(), "raw_value": 3.0}
        ]
    });

    let req = TestApp::request(Method::POST, "/api/v1/telemetry")
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap();

    let resp = app.oneshot(req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let rows = store::list_recent_by_sensor(&app.pool, sensor_id, 1)
        .await
        .expect("failed to read back telemetry row");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].physical_value, None);
    assert_eq!(rows[0].conversion_status, "raw_only");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lookup_table_clamps_outside_range_and_interpolates_inside() {
    let app = TestApp::new().await;
    let project_id = Uuid::new_v4();
    let (sensor_id, token) = create_test_sensor(&app.pool, project_id).await;
    publish_test_profile(
        &app.pool,
        sensor_id,
        "lookup_table",
        json!({"points": [
            {"raw": 0.0, "physical": 0.0},
            {"raw": 10.0, "physical": 100.0},
            {"raw": 20.0, "physical": 200.0},
        ]}),
    )
    .await;

    let body = json!({
        "sensor_id": sensor_id,
        "readings": [
            {"timestamp": Utc::now().to_rfc3339(), "raw_value": -5.0},
            {"timestamp": Utc::now().to_rfc3339(), "raw_value": 30.0},
            {"timestamp": Utc::now().to_rfc3339(), "raw_value": 5.0},
        ]
    });

    let req = TestApp::request(Method::POST, "/api/v1/telemetry")
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap();

    let resp = app.oneshot(req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let rows = store::list_recent_by_sensor(&app.pool, sensor_id, 3)
        .await
        .expect("failed to read back telemetry rows");
    assert_eq!(rows.len(), 3);

    let by_raw: std::collections::HashMap<i64, f64> = rows
        .iter()
        .map(|r| (r.raw_value.round() as i64, r.physical_value.unwrap()))
        .collect();
    assert_eq!(by_raw[&-5], 0.0);
    assert_eq!(by_raw[&30], 200.0);
    assert_eq!(by_raw[&5], 50.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_bearer_token_is_unauthorized() {
    let app = TestApp::new().await;
    let project_id = Uuid::new_v4();
    let (sensor_id, _token) = create_test_sensor(&app.pool, project_id).await;

    let body = json!({
        "sensor_id": sensor_id,
        "readings": [{"timestamp": Utc::now().to_rfc3339(), "raw_value": 1.0}]
    });

    let req = TestApp::request(Method::POST, "/api/v1/telemetry")
        .header("Authorization", "Bearer not-the-right-token")
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap();

    let resp = app.oneshot(req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_exceeding_max_size_is_rejected() {
    let app = TestApp::new().await;
    let project_id = Uuid::new_v4();
    let (sensor_id, token) = create_test_sensor(&app.pool, project_id).await;

    let readings: Vec<_> = (0..10_001)
        .map(|_| json!({"timestamp": Utc::now().to_rfc3339(), "raw_value": 1.0}))
        .collect();
    let body = json!({"sensor_id": sensor_id, "readings": readings});

    let req = TestApp::request(Method::POST, "/api/v1/telemetry")
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap();

    let resp = app.oneshot(req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
