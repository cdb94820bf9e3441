//! HTTP service: the extraction endpoint, quota queries, menu-item CRUD,
//! reconciliation and tastings.
//!
//! Sessions are read from the `session` cookie or an `Authorization: Bearer`
//! header. Errors are JSON `{error}` bodies with the status from
//! [`error::ApiError::status`].

pub mod error;
pub mod routes;
pub mod state;

use crate::config::ServerConfig;
use crate::error::ScanError;
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{get, post, put},
    Router,
};
use routes::*;
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal::{self, ctrl_c};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the router for `state`.
pub fn router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/gemini-menu", post(gemini_menu_handler))
        .route("/api/usage", get(usage_handler))
        .route("/api/admin/usage/reset", post(admin_reset_handler))
        .route(
            "/api/menu-items",
            get(list_items_handler)
                .post(create_item_handler)
                .put(update_item_handler)
                .delete(delete_item_handler),
        )
        .route("/api/menu-items/reconcile", post(reconcile_handler))
        .route("/api/menu-items/batch", post(batch_handler))
        .route("/api/menu-items/:id/tasting", put(put_tasting_handler))
        .route("/api/restaurants/:id/menu", get(restaurant_menu_handler))
        .route("/api/restaurants/:id/tastings", get(restaurant_tastings_handler))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `config.bind` and serve until Ctrl+C or SIGTERM.
pub async fn serve(state: Arc<AppState>, config: &ServerConfig) -> Result<(), ScanError> {
    let app = router(state, config);

    info!("Binding to {}", config.bind);
    let listener = TcpListener::bind(&config.bind)
        .await
        .map_err(|e| ScanError::Internal(format!("Failed to bind {}: {}", config.bind, e)))?;
    info!("Server running on {}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ScanError::Internal(format!("Server error: {e}")))?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        } else {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
