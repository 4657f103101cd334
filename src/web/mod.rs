//! Web server module

mod admin;
mod auth;
mod error;
mod extract;
mod ingest;
mod middleware;
mod routes;

use anyhow::Result;
use axum::{
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use std::{any::Any, net::SocketAddr, sync::Arc};
use tokio::signal;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::db::Database;

use error::ApiError;

/// Listed in the body of every 404
pub const ENDPOINTS: &[&str] = &[
    "GET /",
    "GET /health",
    "POST /api/location",
    "GET /api/locations",
    "GET /api/locations/machine/:name",
    "GET /api/machines",
    "GET /api/stats",
    "GET /api/database/size",
    "GET /api/database/info",
    "DELETE /api/admin/clear-database",
    "DELETE /api/admin/clear-machine/:name",
];

pub struct AppState {
    pub db: Database,
    pub api_key: Option<String>,
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Handler panicked: {}", detail);
    ApiError::Internal("Internal server error".to_string()).into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    let app = Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/api/location", post(ingest::create_location))
        .route("/api/locations", get(routes::list_locations))
        .route("/api/locations/machine/:name", get(routes::machine_locations))
        .route("/api/machines", get(routes::list_machines))
        .route("/api/stats", get(routes::stats))
        .route("/api/database/size", get(routes::database_size))
        .route("/api/database/info", get(routes::database_info))
        .route("/api/admin/clear-database", delete(admin::clear_database))
        .route("/api/admin/clear-machine/:name", delete(admin::clear_machine))
        .fallback(not_found)
        .with_state(state);

    with_layers(app)
}

/// Panics become JSON 500s inside the request logger, so they still get an outcome line.
fn with_layers(app: Router) -> Router {
    app.layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::RequestLoggingLayer)
        .layer(CorsLayer::permissive())
}

/// Serve until SIGINT/SIGTERM, then let in-flight requests finish.
pub async fn start_server(config: &Config, db: Database) -> Result<()> {
    let state = Arc::new(AppState {
        db,
        api_key: config.security.api_key.clone(),
    });

    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Web server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Web server stopped accepting requests");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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
