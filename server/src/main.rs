//! Telemetry Core - Main Entry Point
//!
//! Experiment-telemetry data plane: ingest, conversion backfill, and
//! webhook delivery over a single PostgreSQL pool.

use anyhow::Result;
use std::time::Duration;
use tracing::info;

use telemetry_core::{api, backfill, config::Config, db, webhooks};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telemetry_core=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        env = %config.env_name,
        "Starting Telemetry Core"
    );

    let db_pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    db::run_migrations(&db_pool).await?;

    let backfill_handle = backfill::worker::spawn(
        db_pool.clone(),
        Duration::from_secs(config.backfill_poll_interval_secs),
        config.backfill_page_size,
        chrono::Duration::seconds(config.backfill_lease_timeout_secs),
    );

    let webhook_worker_handles = webhooks::worker::spawn_workers(
        db_pool.clone(),
        webhooks::worker::WorkerConfig {
            poll_interval: Duration::from_secs(config.webhook_poll_interval_secs),
            claim_batch_size: config.webhook_claim_batch_size,
            request_timeout: Duration::from_secs(config.webhook_request_timeout_secs),
            max_attempts: config.webhook_max_attempts,
            backoff_base: chrono::Duration::seconds(config.webhook_backoff_base_secs),
            backoff_cap: chrono::Duration::seconds(config.webhook_backoff_cap_secs),
        },
        config.webhook_worker_count,
    );

    let webhook_sweeper_handle = webhooks::worker::spawn_sweeper(
        db_pool.clone(),
        Duration::from_secs(config.webhook_poll_interval_secs),
        chrono::Duration::seconds(config.webhook_lease_timeout_secs),
    );

    let bind_address = config.bind_address.clone();
    let state = api::AppState::new(db_pool, config);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(address = %bind_address, "Server listening");

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
        info!("received shutdown signal, draining in-flight requests");
    };

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal).await?;

    backfill_handle.abort();
    webhook_sweeper_handle.abort();
    for handle in webhook_worker_handles {
        handle.abort();
    }

    info!("server shutdown complete");
    Ok(())
}
