//! Eventgram HTTP server.
//!
//! Runs the API on in-memory adapters with the background image worker.

use eventgram::auth::StaticIdentityProvider;
use eventgram::images::{ImageWorker, channel, default_variants};
use eventgram::storage::{InMemoryBlobStore, InMemoryEntityStore};
use eventgram::{AppState, Config, build_router};
use eventgram_core::environment::SystemClock;
use eventgram_core::id::TimeOrderedIdGenerator;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Eventgram HTTP server");
    info!(
        bind = %config.bind_address(),
        bucket = %config.storage.bucket,
        feed_page_size = config.policy.feed_page_size,
        "Configuration loaded"
    );

    if config.server.metrics_enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.metrics_port));
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!(address = %addr, "Prometheus exporter listening");
    }

    // Adapters
    let clock = Arc::new(SystemClock);
    let entities = Arc::new(InMemoryEntityStore::new());
    let blobs = Arc::new(InMemoryBlobStore::new(config.storage.clone()));
    let ids = Arc::new(TimeOrderedIdGenerator::with_os_random(clock.clone()));
    let identity = Arc::new(StaticIdentityProvider::parse(&config.auth.static_tokens));
    if identity.is_empty() {
        warn!("No static tokens configured; every caller is anonymous");
    } else {
        info!(tokens = identity.len(), "Static identity provider loaded");
    }

    // Image worker
    let (queue, receiver) = channel(config.images.queue_capacity);
    let worker = ImageWorker::new(blobs.clone(), default_variants(&config.images));
    let worker_handle = tokio::spawn(worker.run(receiver));

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let addr = config.bind_address();
    let state = AppState::new(
        config,
        clock,
        entities,
        blobs,
        ids,
        Arc::new(queue),
        identity,
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Server listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned the last queue sender, so the worker drains and stops.
    match tokio::time::timeout(shutdown_timeout, worker_handle).await {
        Ok(Ok(())) => info!("Image worker drained"),
        Ok(Err(join_error)) => error!(error = %join_error, "Image worker failed"),
        Err(_) => warn!(
            timeout_secs = shutdown_timeout.as_secs(),
            "Image worker did not drain before the shutdown timeout"
        ),
    }

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
