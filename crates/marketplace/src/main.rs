//! Marketplace core host.

use std::sync::Arc;

use domain::{InMemoryItemCatalog, InMemoryUserDirectory};
use event_store::{EventStore, InMemoryEventStore, PostgresEventStore, PostgresKeyRegistry};
use marketplace::{Collaborators, Config, Marketplace, MarketplaceError, telemetry};
use notifications::{PostgresNotificationStore, PostgresPreferenceStore};
use projections::PostgresCheckpointStore;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
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

async fn serve<S: EventStore + Clone + 'static>(
    store: S,
    collaborators: Collaborators,
    config: &Config,
) -> Result<(), MarketplaceError> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (marketplace, dispatcher) =
        Marketplace::start(store, collaborators, config, shutdown_rx.clone());

    // notifications stored by a previous run but never dispatched
    let requeued = marketplace.notifications().redispatch_unsent().await?;
    marketplace.sync().await;
    let processor = marketplace.spawn_processor(shutdown_rx);
    tracing::info!(requeued, "marketplace core running");

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    let _ = processor.await;
    let _ = dispatcher.await;

    tracing::info!("marketplace core shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), MarketplaceError> {
    // 1. Configuration and observability
    let config = Config::from_env();
    telemetry::init_tracing(&config)?;
    if let Some(addr) = config.metrics_addr {
        telemetry::install_metrics(addr)?;
    }

    // 2. Collaborators owned by the surrounding marketplace
    let collaborators = Collaborators::in_memory(
        Arc::new(InMemoryItemCatalog::new()),
        Arc::new(InMemoryUserDirectory::new()),
    );

    // 3. Storage, then run until signalled
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await?;
            let store = PostgresEventStore::new(pool.clone());
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL storage");

            let collaborators = collaborators
                .with_keys(Arc::new(PostgresKeyRegistry::new(pool.clone())))
                .with_checkpoints(Arc::new(PostgresCheckpointStore::new(pool.clone())))
                .with_notification_store(Arc::new(PostgresNotificationStore::new(pool.clone())))
                .with_preferences(Arc::new(PostgresPreferenceStore::new(pool)));
            serve(store, collaborators, &config).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, events are kept in memory");
            serve(InMemoryEventStore::new(), collaborators, &config).await
        }
    }
}
