pub mod access;
pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod cors;
pub mod db;
pub mod error;
pub mod rate_limit;

use access::{AccessFilter, AccessState, IpExtractor, filter_access};
use api::create_api_router;
use auth::{SessionManager, SessionSettings, resolve_session};
use axum::{Router, middleware};
use config::AppConfig;
use cors::{CorsState, cors_middleware};
use db::Database;
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Settings from the configuration file
    pub app: AppConfig,
    /// Client address strategy when running behind a proxy
    pub ip_extractor: Option<IpExtractor>,
}

impl ServerConfig {
    pub fn session_manager(&self) -> SessionManager {
        SessionManager::new(self.db.clone(), SessionSettings::from(&self.app))
    }
}

/// Create the application router with the given configuration.
///
/// Requests pass the access filter first, then CORS handling, then session
/// resolution, before reaching a handler.
pub fn create_app(config: &ServerConfig) -> Router {
    let filter = AccessFilter::compile(&config.app.access_policy);
    info!(
        default = ?filter.default_decision(),
        deny = ?filter.deny_patterns().collect::<Vec<_>>(),
        allow = ?filter.allow_patterns().collect::<Vec<_>>(),
        "Access policy compiled"
    );
    let access_state = AccessState {
        filter: Arc::new(filter),
        ip_extractor: config.ip_extractor.clone(),
    };
    let sessions = config.session_manager();
    let rate_limit_config = Arc::new(RateLimitConfig::new(&config.app.rate_limit));

    let api_router = create_api_router(config.db.clone(), sessions.clone(), rate_limit_config)
        .layer(middleware::from_fn_with_state(sessions, resolve_session));

    Router::new()
        .nest("/api", api_router)
        .layer(middleware::from_fn_with_state(
            CorsState::new(&config.app.cors_origin),
            cors_middleware,
        ))
        .layer(middleware::from_fn_with_state(access_state, filter_access))
}

/// Run the expiry sweep once and spawn the background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(config: &ServerConfig) {
    let sessions = config.session_manager();
    cleanup::run_cleanup(&sessions).await;
    cleanup::spawn_cleanup_scheduler(sessions);
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
