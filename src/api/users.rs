//! User administration.
//!
//! All endpoints require an administrator session.
//!
//! - GET `/` - List users
//! - GET `/{key}` - Get a single user
//! - PUT `/` - Create a user
//! - PATCH `/` - Update a user, optionally setting a new password
//! - DELETE `/{key}` - Delete a user and end its sessions

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tracing::{info, warn};

use super::error::{ApiError, ApiJson, ResultExt, decode_password};
use crate::auth::{Auth, hash_password};
use crate::db::{Database, NewUser, Session, User, UserLevel};

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
}

pub fn router(state: UsersState) -> Router {
    Router::new()
        .route("/", get(list_users).put(create_user).patch(update_user))
        .route("/{key}", get(get_user).delete(delete_user))
        .with_state(state)
}

fn require_admin(session: &Session) -> Result<(), ApiError> {
    match session.user.as_ref().map(|user| user.level) {
        Some(UserLevel::Admin) => Ok(()),
        _ => {
            warn!(user = %session.user_key, "User management attempted without admin level");
            Err(ApiError::forbidden("Administrator privileges required"))
        }
    }
}

/// Trimmed value of a mandatory text field.
fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(format!(
            "Parameter '{field}' is required and must be a non-empty string."
        )));
    }
    Ok(value)
}

/// Decode a new password and its confirmation. They must match and not be empty.
fn new_password(password: &str, confirmation: &str) -> Result<String, ApiError> {
    let password = decode_password("password", password)?;
    let confirmation = decode_password("confirmation", confirmation)?;

    if password.is_empty() {
        return Err(ApiError::bad_request("The new password cannot be empty."));
    }
    if password != confirmation {
        return Err(ApiError::conflict("Password does not match confirmation."));
    }
    Ok(password)
}

async fn list_users(
    State(state): State<UsersState>,
    Auth(session): Auth,
) -> Result<Json<Vec<User>>, ApiError> {
    require_admin(&session)?;

    let users = state
        .db
        .users()
        .list()
        .await
        .db_err("Failed to retrieve user list")?;

    Ok(Json(users))
}

async fn get_user(
    State(state): State<UsersState>,
    Auth(session): Auth,
    Path(key): Path<String>,
) -> Result<Json<User>, ApiError> {
    require_admin(&session)?;

    let user = state
        .db
        .users()
        .get_by_key(&key)
        .await
        .db_err("Failed to load user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(user))
}

#[derive(Deserialize)]
struct CreateUserRequest {
    username: String,
    name: String,
    email: String,
    #[serde(default)]
    level: Option<UserLevel>,
    /// Base64 encoded
    password: String,
    /// Base64 encoded
    confirmation: String,
}

async fn create_user(
    State(state): State<UsersState>,
    Auth(session): Auth,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> Result<Json<User>, ApiError> {
    require_admin(&session)?;

    let username = required("username", &payload.username)?;
    let name = required("name", &payload.name)?;
    let email = required("email", &payload.email)?;
    let password = new_password(&payload.password, &payload.confirmation)?;

    let users = state.db.users();
    if users
        .get_by_username(username)
        .await
        .db_err("Failed to check username")?
        .is_some()
    {
        return Err(ApiError::conflict("Username is already taken."));
    }

    let key = uuid::Uuid::new_v4().to_string();
    let level = payload.level.unwrap_or(UserLevel::User);
    let password_hash = hash_password(&password)?;
    users
        .create(&NewUser {
            key: &key,
            username,
            name,
            email,
            level,
            password_hash: &password_hash,
        })
        .await
        .db_err("Failed to add new user")?;

    info!(admin = %session.user_key, user = %key, %username, "User created");

    Ok(Json(User {
        key,
        username: username.to_string(),
        name: name.to_string(),
        email: email.to_string(),
        level,
    }))
}

#[derive(Deserialize)]
struct UpdateUserRequest {
    #[serde(alias = "_key")]
    key: String,
    name: String,
    email: String,
    /// Left unchanged when absent.
    #[serde(default)]
    level: Option<UserLevel>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    confirmation: Option<String>,
}

async fn update_user(
    State(state): State<UsersState>,
    Auth(session): Auth,
    ApiJson(payload): ApiJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&session)?;

    let key = required("key", &payload.key)?;
    let name = required("name", &payload.name)?;
    let email = required("email", &payload.email)?;

    let password_hash = match &payload.password {
        Some(password) => {
            let confirmation = payload.confirmation.as_deref().ok_or_else(|| {
                ApiError::bad_request("Parameter 'confirmation' is required with 'password'.")
            })?;
            Some(hash_password(&new_password(password, confirmation)?)?)
        }
        None => None,
    };

    let users = state.db.users();
    let user = users
        .get_by_key(key)
        .await
        .db_err("Failed to load user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    users
        .update(key, name, email, payload.level.unwrap_or(user.level))
        .await
        .db_err("Failed to update user data")?;

    if let Some(hash) = password_hash {
        users
            .update_password(key, &hash)
            .await
            .db_err("Failed to update user password")?;
    }

    info!(admin = %session.user_key, user = %key, "User updated");
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_user(
    State(state): State<UsersState>,
    Auth(session): Auth,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&session)?;

    let deleted = state
        .db
        .users()
        .delete(&key)
        .await
        .db_err("Failed to remove the user")?;
    if !deleted {
        return Err(ApiError::not_found("User not found"));
    }

    info!(admin = %session.user_key, user = %key, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}
