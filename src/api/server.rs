use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::{
    services::{download, health, upload, ws_handler},
    state::{AppState, DOWNLOAD_PREFIX},
};
use crate::config::Config;
use crate::observability::Metrics;
use crate::storage::{LocalArtifactStore, SweepTrigger, Sweeper};
use crate::transform::ImageTransformer;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build the HTTP router over `state`
pub fn router(state: AppState) -> Router {
    let upload_limit = state.config.server.max_upload_bytes.as_usize();

    Router::new()
        .route(
            "/api/v1/upload",
            post(upload)
                // Multipart reads are bounded by the request limit instead
                .layer::<_, std::convert::Infallible>(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(upload_limit)),
        )
        .route("/ws", get(ws_handler))
        .route(&format!("{DOWNLOAD_PREFIX}{{filename}}"), get(download))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Run the server until Ctrl+C or SIGTERM
///
/// On shutdown, open listeners are told to go away, queued uploads are
/// drained and the sweeper is stopped.
pub async fn run(config: Config) -> Result<(), AnyError> {
    let metrics = Arc::new(Metrics::new());

    let (trigger, signals) = SweepTrigger::channel();
    let store = Arc::new(
        LocalArtifactStore::open(&config.storage.root, config.ttl())
            .await?
            .with_sweep_trigger(trigger),
    );
    let sweeper = Sweeper::spawn(
        store.clone(),
        signals,
        config.sweep_interval(),
        metrics.clone(),
    );

    let address = config.server.bind_addr;
    let transformer = Arc::new(ImageTransformer::new(config.max_dimensions()));
    let state = AppState::new(config, store, transformer, metrics);
    let app = router(state.clone());

    let listener = TcpListener::bind(address).await?;
    info!(%address, "ResizeBox listening");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    state.pool.shutdown().await;
    sweeper.abort();
    info!("ResizeBox stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
