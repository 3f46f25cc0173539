use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use super::api::{self, AppState};
use super::ws;
use crate::board::BoardController;
use crate::config::ServerSection;

/// Full application router: JSON API plus the notification socket.
///
/// Dev mode adds a permissive CORS layer so a front-end dev server on
/// another port can call the API.
pub fn build_router(controller: Arc<BoardController>, dev_mode: bool) -> Router {
    let app = api::api_router()
        .route("/ws", get(ws::ws_handler))
        .with_state(AppState::shared(controller));
    if dev_mode {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

pub async fn bind(config: &ServerSection) -> Result<TcpListener> {
    let addr = format!("{}:{}", config.host, config.port);
    TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))
}

/// Serve until Ctrl+C, then tear down board state.
///
/// An initial refresh is attempted first; if it fails the server still
/// starts and clients can retry through `/api/board/refresh`.
pub async fn serve(listener: TcpListener, controller: Arc<BoardController>, dev_mode: bool) -> Result<()> {
    if let Err(e) = controller.refresh().await {
        tracing::warn!(error = %e, "initial board refresh failed");
    }

    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, dev_mode, "dealboard server listening");

    let app = build_router(controller.clone(), dev_mode);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    controller.shutdown();
    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
