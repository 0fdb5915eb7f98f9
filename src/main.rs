//! Transaction Processing Engine - main application entry point.
//!
//! Wires the three core subsystems (Transaction Processor, Idempotency
//! Layer, Outbox Relay) to the HTTP ingress adapter served here; the bus
//! consumer adapter (`crate::consumer`) is a second ingress onto the same
//! Processor, wired by whatever broker integration a deployment adds.

use std::sync::Arc;

use axum::{
    Router,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use ledger_transfer_engine::services::{outbox_relay::OutboxRelay, processor::TransactionProcessor};
use ledger_transfer_engine::state::AppState;
use ledger_transfer_engine::{bus, config, db, handlers, middleware};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("configuration loaded");

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("database migrations complete");

    let processor = Arc::new(TransactionProcessor::new(
        pool.clone(),
        config.idempotency_window_hours,
        config.processor_backoff(),
    ));

    let publisher = Arc::new(bus::WebhookLedgerPublisher::new(pool.clone()));
    let relay = OutboxRelay::new(
        pool.clone(),
        publisher,
        config.outbox_polling_interval_ms,
        config.outbox_batch_size,
        config.outbox_max_retries,
    );
    tokio::spawn(relay.run());
    tracing::info!("outbox relay started");

    let state = AppState {
        pool: pool.clone(),
        processor,
    };

    let protected = Router::new()
        .route("/api/v1/accounts", post(handlers::accounts::create_account))
        .route("/api/v1/accounts", get(handlers::accounts::list_accounts))
        .route("/api/v1/accounts/{id}", get(handlers::accounts::get_account))
        .route(
            "/api/v1/webhooks",
            post(handlers::webhooks::create_webhook),
        )
        .route("/api/v1/webhooks", get(handlers::webhooks::list_webhooks))
        .route(
            "/api/v1/webhooks/{id}",
            axum::routing::delete(handlers::webhooks::delete_webhook),
        )
        .layer(axum_middleware::from_fn_with_state(
            pool.clone(),
            middleware::auth::auth_middleware,
        ));

    let app = Router::new()
        .route(
            "/api/v1/transactions",
            post(handlers::transactions::create_transaction),
        )
        .route(
            "/api/v1/transactions/{id}",
            get(handlers::transactions::get_transaction),
        )
        .route(
            "/api/v1/transactions/health",
            get(handlers::health::health_check),
        )
        .route("/health", get(handlers::health::health_check))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.listen_port)).await?;
    tracing::info!(port = config.listen_port, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
