//! Alerte Communautaire notification service
//!
//! Keeps the unread badges of the admin and citizen dashboards in sync with the alerting
//! backend, and persists per-collection "last seen" watermarks in SQLite.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod fetcher;
mod models;
mod notify;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{Config, LogFormat};
use db::WatermarkStore;
use fetcher::BackendClient;
use notify::DashboardRegistry;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub dashboards: Arc<DashboardRegistry>,
    pub backend: Arc<BackendClient>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(env_filter);
    match config.log_format {
        LogFormat::Json => subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => subscriber.with(tracing_subscriber::fmt::layer()).init(),
    }

    tracing::info!("Starting Alerte Communautaire notification service");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Backend URL: {}", config.backend_url);
    tracing::info!("Poll interval: {:?}", config.poll_interval);
    tracing::info!("Dashboard idle TTL: {:?}", config.dashboard_ttl);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (ALERTE_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let store = WatermarkStore::new(pool);

    let backend = Arc::new(BackendClient::new(
        &config.backend_url,
        config.backend_token.clone(),
        config.fetch_timeout,
    )?);

    let dashboards = Arc::new(DashboardRegistry::new(
        backend.clone(),
        store,
        config.poll_interval,
        config.dashboard_ttl,
    ));
    // Clients that vanish without unmounting stop being polled after the TTL.
    let _sweeper = DashboardRegistry::spawn_sweeper(&dashboards, config.dashboard_ttl / 2);

    // Create application state
    let state = AppState {
        dashboards,
        backend,
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // API routes
    let api_routes = Router::new()
        // Dashboard lifecycle
        .route("/dashboards", post(api::mount_dashboard))
        .route(
            "/dashboards/{id}",
            get(api::get_dashboard).delete(api::unmount_dashboard),
        )
        // Tabs
        .route("/dashboards/{id}/tabs", get(api::get_tabs))
        .route("/dashboards/{id}/tabs/changes", get(api::wait_for_tabs))
        .route(
            "/dashboards/{id}/tabs/{tab_id}/activate",
            post(api::activate_tab),
        )
        // Data changes
        .route("/dashboards/{id}/refresh", post(api::refresh_dashboard))
        .route(
            "/dashboards/{id}/alerts/{alert_id}/terminate",
            post(api::terminate_alert),
        )
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
