//! Session endpoints.
//!
//! - POST `/login` - Check credentials and open a session
//! - POST `/continue` - Revive an expired session with its remember-me token
//! - GET `/logout` - Terminate the current session

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ApiJson, decode_password};
use crate::auth::{Auth, OptionalAuth, SessionManager, authenticate, session_id};
use crate::db::Database;
use crate::error::Error;
use crate::rate_limit::{RateLimitConfig, rate_limit_auth};

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub sessions: SessionManager,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

pub fn router(state: AuthState) -> Router {
    let limited = Router::new()
        .route("/login", post(login))
        .route("/continue", post(continue_session))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_auth,
        ));

    Router::new()
        .route("/logout", get(logout))
        .with_state(state)
        .merge(limited)
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    /// Base64 encoded
    password: String,
    #[serde(default)]
    remember_me: bool,
}

#[derive(Serialize)]
struct LoginResponse {
    session_id: String,
    expires: String,
    /// Raw token, empty unless remember-me was requested.
    remember_me_token: String,
    remember_me_expires: String,
}

async fn login(
    State(state): State<AuthState>,
    OptionalAuth(current): OptionalAuth,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if current.is_some() {
        return Err(ApiError::bad_request("Already logged in"));
    }

    let password = decode_password("password", &payload.password)?;
    let username = payload.username.trim();

    let user = match authenticate(&state.db, username, &password).await {
        Ok(user) => user,
        Err(Error::Unauthorized) => {
            warn!(%username, "Invalid login attempt");
            return Err(ApiError::Unauthorized);
        }
        Err(e) => return Err(e.into()),
    };

    let now = Utc::now();
    let mut session = state.sessions.create_session(Some(&user), now)?;
    let remember_me_token = if payload.remember_me {
        state.sessions.establish_remember_me(&mut session, now)?
    } else {
        String::new()
    };
    state.sessions.persist(&session).await?;

    info!(username = %user.username, remember_me = payload.remember_me, "User logged in");

    Ok(Json(LoginResponse {
        session_id: session.key,
        expires: session.expires,
        remember_me_token,
        remember_me_expires: session.remember_me_expires.unwrap_or_default(),
    }))
}

#[derive(Deserialize)]
struct ContinueRequest {
    token: String,
}

async fn continue_session(
    State(state): State<AuthState>,
    OptionalAuth(current): OptionalAuth,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<ContinueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if current.is_some() {
        return Err(ApiError::bad_request("Already logged in"));
    }

    let key = session_id(&headers)
        .ok_or_else(|| ApiError::bad_request("Cannot continue session without session id."))?;

    match state
        .sessions
        .continue_session(key, &payload.token, Utc::now())
        .await
    {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        Err(Error::NotFound) => {
            warn!(session = %key, "Rejected session continuation");
            Err(ApiError::Unauthorized)
        }
        Err(e) => Err(e.into()),
    }
}

async fn logout(
    State(state): State<AuthState>,
    Auth(session): Auth,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.terminate_session(&session.key).await?;
    info!(session = %session.key, "Session terminated");
    Ok(StatusCode::NO_CONTENT)
}
