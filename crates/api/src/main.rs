//! Order checkout service entry point.
//!
//! Runs the HTTP API, the payment consumer and the outbox dispatcher until
//! SIGINT or SIGTERM.

use std::sync::Arc;

use api::{Config, LogFormat};
use bus::{BusError, KafkaEventBus};
use checkout::{CatalogError, EventPublisher, HttpProductCatalog, OutboxDispatcher, ProductCatalog};
use order_store::{PostgresOrderStore, StoreError};
use reconciler::{ConsumerError, PaymentSettledConsumer};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Error)]
enum StartupError {
    #[error("failed to install Prometheus recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to connect to database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to prepare order store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to create event bus: {0}")]
    Bus(#[from] BusError),

    #[error("failed to create catalog client: {0}")]
    Catalog(#[from] CatalogError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payment consumer failed: {0}")]
    Consumer(#[from] ConsumerError),
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Connect the order store
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    let store = Arc::new(PostgresOrderStore::new(pool));
    store.run_migrations().await?;

    // 4. Connect the event bus
    let bus = Arc::new(KafkaEventBus::builder().brokers(&config.kafka_brokers).build()?);

    let catalog = match &config.catalog_url {
        Some(url) => {
            tracing::info!(%url, "product catalog check enabled");
            let catalog = HttpProductCatalog::new(url.as_str(), config.catalog_timeout)?;
            Some(Arc::new(catalog) as Arc<dyn ProductCatalog>)
        }
        None => None,
    };

    // 5. Start background workers
    let shutdown = CancellationToken::new();

    let consumer =
        PaymentSettledConsumer::new(Arc::clone(&store), Arc::clone(&bus), config.consumer_config());
    let consumer_shutdown = shutdown.clone();
    let consumer_task = tokio::spawn(async move {
        let result = consumer.run(consumer_shutdown.child_token()).await;
        if result.is_err() {
            // A stopped consumer takes the whole service down.
            consumer_shutdown.cancel();
        }
        result
    });

    let dispatcher = OutboxDispatcher::new(
        Arc::clone(&store),
        EventPublisher::new(Arc::clone(&bus)),
        config.dispatcher_config(),
    );
    let dispatcher_task = tokio::spawn(dispatcher.run(shutdown.child_token()));

    // 6. Build the application and serve
    let state = api::create_state(store, bus, catalog);
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_shutdown = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                () = shutdown_signal() => {}
                () = server_shutdown.cancelled() => {
                    tracing::error!("background worker failed, starting shutdown");
                }
            }
        })
        .await;

    // 7. Stop background workers
    shutdown.cancel();
    let consumer_result = match consumer_task.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "payment consumer task panicked");
            Ok(())
        }
    };
    if let Err(e) = dispatcher_task.await {
        tracing::error!(error = %e, "outbox dispatcher task panicked");
    }

    served?;
    if let Err(e) = consumer_result {
        tracing::error!(error = %e, "payment consumer stopped with error");
        return Err(e.into());
    }
    tracing::info!("server shut down gracefully");
    Ok(())
}
