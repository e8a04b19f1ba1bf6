use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use event_photos::{
    config::Config,
    create_app,
    database::Database,
    handlers::AppState,
    services::{DualDestinationWriter, ExpirySweeper, PhotoService},
    storage::{create_content_store, rendition::ImageDeliveryClient, RenditionStore},
    utils::{Clock, KeyGenerator, SystemClock},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;

    let database = Database::new(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    database
        .migrate()
        .await
        .context("Failed to run migrations")?;
    let database = Arc::new(database);

    let content = create_content_store(&config.content_store)
        .await
        .context("Failed to initialize content store")?;
    let renditions: Arc<dyn RenditionStore> = Arc::new(
        ImageDeliveryClient::new(&config.rendition)
            .context("Failed to initialize rendition client")?,
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let writer = DualDestinationWriter::new(
        content,
        renditions,
        clock.clone(),
        Arc::new(KeyGenerator::from_entropy()),
        config.upload.write_timeout(),
    );

    let photos = Arc::new(PhotoService::new(
        database.clone(),
        database.clone(),
        database.clone(),
        writer.clone(),
        clock.clone(),
        config.upload.clone(),
    ));

    let shutdown = CancellationToken::new();
    let sweeper = if config.sweeper.enabled {
        let sweeper = Arc::new(ExpirySweeper::new(
            database.clone(),
            database.clone(),
            database.clone(),
            writer,
            clock,
        ));
        Some(sweeper.spawn(config.sweeper.interval(), shutdown.clone()))
    } else {
        info!("Expiry sweeper disabled");
        None
    };

    let state = AppState {
        database,
        photos,
        metrics: metrics_handle,
    };
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "Event photos server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Some(handle) = sweeper {
        handle.await.context("Expiry sweeper task panicked")?;
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
