mod auth;
mod error;
mod profile;
mod users;

use axum::{Json, Router, routing::get};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::SessionManager;
use crate::db::Database;
use crate::rate_limit::RateLimitConfig;

pub use error::{ApiError, ApiJson, ResultExt};

/// Create the API router.
pub fn create_api_router(
    db: Database,
    sessions: SessionManager,
    rate_limit_config: Arc<RateLimitConfig>,
) -> Router {
    let auth_state = auth::AuthState {
        db: db.clone(),
        sessions,
        rate_limit_config,
    };

    let profile_state = profile::ProfileState { db: db.clone() };
    let users_state = users::UsersState { db };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/profile", profile::router(profile_state))
        .nest("/users", users::router(users_state))
        .route("/version", get(version))
}

#[derive(Serialize)]
struct VersionResponse {
    version: &'static str,
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
    })
}
