//! Profile of the logged in user.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tracing::info;

use super::error::{ApiError, ApiJson, ResultExt, decode_password};
use crate::auth::{Auth, hash_password, verify_password};
use crate::db::{Database, User};

#[derive(Clone)]
pub struct ProfileState {
    pub db: Database,
}

pub fn router(state: ProfileState) -> Router {
    Router::new()
        .route("/", get(get_profile).patch(patch_profile))
        .route("/updatePassword", post(update_password))
        .with_state(state)
}

async fn get_profile(
    State(state): State<ProfileState>,
    Auth(session): Auth,
) -> Result<Json<User>, ApiError> {
    let user = state
        .db
        .users()
        .get_by_key(&session.user_key)
        .await
        .db_err("Failed to load user data")?
        .ok_or(ApiError::Unauthorized)?;

    Ok(Json(user))
}

#[derive(Deserialize)]
struct PatchProfileRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

async fn patch_profile(
    State(state): State<ProfileState>,
    Auth(session): Auth,
    ApiJson(payload): ApiJson<PatchProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = payload.name.filter(|n| !n.trim().is_empty());
    let email = payload.email.filter(|e| !e.trim().is_empty());
    if name.is_none() && email.is_none() {
        return Ok(StatusCode::NO_CONTENT);
    }

    let user = state
        .db
        .users()
        .get_by_key(&session.user_key)
        .await
        .db_err("Failed to load user data")?
        .ok_or(ApiError::Unauthorized)?;

    state
        .db
        .users()
        .update_profile(
            &user.key,
            name.as_deref().unwrap_or(&user.name),
            email.as_deref().unwrap_or(&user.email),
        )
        .await
        .db_err("Failed to update profile")?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct UpdatePasswordRequest {
    old_password: String,
    password: String,
    confirmation: String,
}

async fn update_password(
    State(state): State<ProfileState>,
    Auth(session): Auth,
    ApiJson(payload): ApiJson<UpdatePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let old_password = decode_password("old_password", &payload.old_password)?;

    let stored_hash = state
        .db
        .users()
        .password_hash_by_key(&session.user_key)
        .await
        .db_err("Failed to check old password")?
        .ok_or(ApiError::Unauthorized)?;

    if !verify_password(&old_password, &stored_hash) {
        return Err(ApiError::bad_request("The provided password was not valid."));
    }

    let password = decode_password("password", &payload.password)?;
    let confirmation = decode_password("confirmation", &payload.confirmation)?;

    if password.is_empty() {
        return Err(ApiError::bad_request("The new password cannot be empty."));
    }
    if password != confirmation {
        return Err(ApiError::conflict(
            "The new password and its confirmation do not match.",
        ));
    }

    let hash = hash_password(&password)?;
    state
        .db
        .users()
        .update_password(&session.user_key, &hash)
        .await
        .db_err("Failed to update password")?;

    info!(user = %session.user_key, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}
