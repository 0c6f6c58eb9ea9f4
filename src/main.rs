//! Tesseract Server
//!
//! A small lightweight HTTP server exposing the `tesseract` binary as a
//! text-extraction service, fronted by bounded per-option-set worker pools.

use std::net::SocketAddr;

use anyhow::Context;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tesseract_server::config::Config;
use tesseract_server::routes;
use tesseract_server::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check(State(_state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tesseract_server=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("invalid configuration")?;

    tracing::info!("starting tesseract-server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        min = config.pool.min,
        max = config.pool.max,
        idle_timeout_ms = config.pool.idle_timeout.as_millis() as u64,
        eviction_interval_ms = config.pool.eviction_run_interval.as_millis() as u64,
        "pool defaults"
    );

    let state = AppState::new(config.clone());

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let mut app = Router::new()
        .route("/health", get(health_check))
        .merge(routes::ocr::router());
    if config.http.status_enable {
        app = app.nest("/status", routes::status::router());
    }
    let app = app
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state.clone());

    // Start server with graceful shutdown
    let addr = SocketAddr::new(
        config.http.host.parse().context("invalid HOST address")?,
        config.http.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("tesseract-server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Drain worker pools once the listener has stopped.
    state.shutdown().await;
    tracing::info!("server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown...");
        },
    }
}
