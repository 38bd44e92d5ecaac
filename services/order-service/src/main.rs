use anyhow::{anyhow, Result};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use common::AppConfig;
use futures_util::stream::StreamExt;
use ingestion::{IngestionCoordinator, WarmUpLoader};
use messaging::{DeadLetterPublisher, OrderConsumer};
use order_store::{OrderStore, PostgresOrderStore};
use read_model::{ColdOrderCache, ReadGateway};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

mod handlers;
mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env();

    init_telemetry(TelemetryConfig::for_service("order-service", &config))
        .map_err(|e| anyhow!("Failed to initialize telemetry: {}", e))?;

    info!("Starting Order Service...");
    info!("Configuration:");
    info!("  Database max connections: {}", config.database.max_connections);
    info!("  Kafka Brokers: {}", config.kafka.brokers);
    info!("  Kafka Topic: {}", config.kafka.topic);
    info!("  Consumer Group: {}", config.kafka.group_id);
    info!("  Dead-letter Topic: {:?}", config.kafka.dead_letter_topic);
    info!("  Port: {}", config.http.port);

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url())
        .await?;
    info!("Database connected");

    let store: Arc<dyn OrderStore> = Arc::new(PostgresOrderStore::new(pool.clone()));

    // Nothing reads or ingests until the cache mirrors the store
    let cache = Arc::new(
        WarmUpLoader::new(store.clone())
            .run(ColdOrderCache::new())
            .await?,
    );

    let mut consumer = OrderConsumer::new(
        &config.kafka.brokers,
        &config.kafka.group_id,
        &[config.kafka.topic.as_str()],
    )?;

    let mut coordinator = IngestionCoordinator::new(store, cache.clone());
    if let Some(topic) = &config.kafka.dead_letter_topic {
        let publisher = DeadLetterPublisher::new(&config.kafka.brokers, topic.clone())?;
        coordinator = coordinator.with_dead_letters(Arc::new(publisher));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let signals = Signals::new([SIGTERM, SIGINT])?;
    let signals_handle = signals.handle();
    let signal_task = tokio::spawn(async move {
        let mut signals = signals;
        if signals.next().await.is_some() {
            info!("Received shutdown signal, stopping...");
        }
        let _ = shutdown_tx.send(true);
    });

    let ingest_shutdown = shutdown_rx.clone();
    let ingest_task = tokio::spawn(async move {
        let stats = coordinator.run(&mut consumer, ingest_shutdown).await;
        consumer.close();
        stats
    });

    let app = routes::create_router(AppState::new(ReadGateway::new(cache)));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http.port));
    info!("Order service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let mut http_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*http_shutdown.borrow() {
                if http_shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .map_err(|e| {
            error!("Server error: {}", e);
            e
        })?;

    info!("HTTP server stopped, waiting for ingestion to finish...");
    match ingest_task.await {
        Ok(stats) => info!(
            "Ingestion finished: {} ingested, {} decode failures, {} persist failures",
            stats.ingested, stats.decode_failures, stats.persist_failures
        ),
        Err(e) => error!("Ingestion task failed: {}", e),
    }

    signals_handle.close();
    signal_task.abort();
    pool.close().await;
    info!("Order service stopped");

    shutdown_telemetry();

    Ok(())
}
