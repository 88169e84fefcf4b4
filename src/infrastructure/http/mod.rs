use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub mod request_id;

pub use request_id::{request_id_middleware, X_REQUEST_ID};

use crate::controllers::{generation::GenerationController, health};
use crate::infrastructure::config::Config;

/// All routes with request ids and tracing applied.
pub fn build_router(controller: Arc<GenerationController>) -> Router {
    let generation_routes = Router::new()
        .route(
            "/api/surveys/:survey_id/tts",
            post(GenerationController::generate),
        )
        .route(
            "/api/surveys/:survey_id/snippet",
            get(GenerationController::snippet),
        )
        .with_state(controller.clone());

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::health_ready))
        .with_state(controller)
        .merge(generation_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Serve until ctrl-c / SIGTERM. Cancels `shutdown` first so running generations stop
/// issuing synthesis calls, then drains open connections.
pub async fn start_http_server(
    config: Arc<Config>,
    controller: Arc<GenerationController>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = build_router(controller);

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;

    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, cancelling active runs");
            shutdown.cancel();
        })
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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
}
