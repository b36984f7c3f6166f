//! Session storage.
//!
//! Only the remember-me token hash is persisted, never the raw token.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;

use super::{User, from_db_time, to_db_time};

/// A server-side session record.
#[derive(Debug, Clone)]
pub struct Session {
    pub key: String,
    pub user_key: String,
    pub created: String,
    pub expires: String,
    /// Hash of the remember-me token
    pub remember_me_token: Option<String>,
    pub remember_me_expires: Option<String>,
    /// Resolved owner, not persisted
    pub user: Option<User>,
}

impl Session {
    pub fn created_at(&self) -> Result<DateTime<Utc>, chrono::ParseError> {
        from_db_time(&self.created)
    }

    pub fn expires_at(&self) -> Result<DateTime<Utc>, chrono::ParseError> {
        from_db_time(&self.expires)
    }

    /// Remember-me expiry, `None` when the session has no remember-me token.
    pub fn remember_me_expires_at(&self) -> Option<Result<DateTime<Utc>, chrono::ParseError>> {
        self.remember_me_expires.as_deref().map(from_db_time)
    }

    pub fn set_created(&mut self, time: DateTime<Utc>) {
        self.created = to_db_time(time);
    }

    pub fn set_expires(&mut self, time: DateTime<Utc>) {
        self.expires = to_db_time(time);
    }

    pub fn set_remember_me_expires(&mut self, time: DateTime<Utc>) {
        self.remember_me_expires = Some(to_db_time(time));
    }

    pub fn has_remember_me(&self) -> bool {
        self.remember_me_token.is_some()
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    key: String,
    user_key: String,
    created: String,
    expires: String,
    remember_me_token: Option<String>,
    remember_me_expires: Option<String>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            key: row.key,
            user_key: row.user_key,
            created: row.created,
            expires: row.expires,
            remember_me_token: row.remember_me_token,
            remember_me_expires: row.remember_me_expires,
            user: None,
        }
    }
}

/// Store for session records.
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a session. Returns its key.
    pub async fn create(&self, session: &Session) -> Result<String, sqlx::Error> {
        sqlx::query(
            "INSERT INTO sessions (key, user_key, created, expires, remember_me_token, remember_me_expires) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.key)
        .bind(&session.user_key)
        .bind(&session.created)
        .bind(&session.expires)
        .bind(&session.remember_me_token)
        .bind(&session.remember_me_expires)
        .execute(&self.pool)
        .await?;

        Ok(session.key.clone())
    }

    pub async fn get_by_key(&self, key: &str) -> Result<Option<Session>, sqlx::Error> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT key, user_key, created, expires, remember_me_token, remember_me_expires FROM sessions WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    /// Get a session by key whose stored remember-me hash equals `token_hash`.
    pub async fn get_with_token(
        &self,
        key: &str,
        token_hash: &str,
    ) -> Result<Option<Session>, sqlx::Error> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT key, user_key, created, expires, remember_me_token, remember_me_expires FROM sessions WHERE key = ? AND remember_me_token = ?",
        )
        .bind(key)
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    /// Write new expiry values. `remember_me_expires` is left untouched when `None`.
    pub async fn update_expiry(
        &self,
        key: &str,
        expires: &str,
        remember_me_expires: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET expires = ?, remember_me_expires = COALESCE(?, remember_me_expires) WHERE key = ?",
        )
        .bind(expires)
        .bind(remember_me_expires)
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a session. Deleting a missing session is not an error.
    pub async fn delete(&self, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every session that expired before `now`.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        // The fixed-width timestamp layout orders lexicographically.
        let result = sqlx::query("DELETE FROM sessions WHERE expires < ?")
            .bind(to_db_time(now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
