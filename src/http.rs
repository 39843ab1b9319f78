//! HTTP entry points
//!
//! Serves the welcome and chat pages, and upgrades `ws_path` requests
//! into hub sessions.

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::error::AppError;
use crate::session::{handle_connection, SessionContext};
use crate::transport::split_websocket;

/// Shared server state
pub struct AppState {
    /// Template cloned into every session
    pub session: SessionContext,
    pub max_message_size: usize,
}

impl AppState {
    pub fn new(session: SessionContext, config: &Config) -> Self {
        Self {
            session,
            max_message_size: config.http.max_message_size,
        }
    }
}

/// Build the application router
pub fn router(state: Arc<AppState>, config: &Config) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route_service("/chat", ServeFile::new(&config.http.chat_page))
        .route("/health", get(health_handler))
        .route(&config.http.ws_path, get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C
///
/// # Errors
///
/// Returns an error if the listener fails.
pub async fn serve(listener: TcpListener, app: Router) -> Result<(), AppError> {
    info!("Chat hub listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

async fn home_handler() -> &'static str {
    "Welcome to the Chat App!"
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ctx = state.session.clone();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| async move {
            let (reader, writer) = split_websocket(socket);
            handle_connection(reader, writer, ctx).await;
        })
}
