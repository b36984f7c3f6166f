use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// Privilege level for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserLevel {
    User,
    Admin,
}

impl UserLevel {
    pub fn as_i64(&self) -> i64 {
        match self {
            UserLevel::User => 0,
            UserLevel::Admin => 99,
        }
    }

    pub fn from_i64(level: i64) -> Self {
        match level {
            99 => UserLevel::Admin,
            _ => UserLevel::User,
        }
    }
}

/// A user record. The password hash is never part of this type.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub key: String,
    pub username: String,
    pub name: String,
    pub email: String,
    pub level: UserLevel,
}

/// Fields for creating a user.
pub struct NewUser<'a> {
    pub key: &'a str,
    pub username: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub level: UserLevel,
    pub password_hash: &'a str,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    key: String,
    username: String,
    name: String,
    email: String,
    level: i64,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            key: row.key,
            username: row.username,
            name: row.name,
            email: row.email,
            level: UserLevel::from_i64(row.level),
        }
    }
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user: &NewUser<'_>) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (key, username, name, email, level, password) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user.key)
        .bind(user.username)
        .bind(user.name)
        .bind(user.email)
        .bind(user.level.as_i64())
        .bind(user.password_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_by_key(&self, key: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT key, username, name, email, level FROM users WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT key, username, name, email, level FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Stored password hash for a username, if the user exists.
    pub async fn password_hash_by_username(
        &self,
        username: &str,
    ) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> = sqlx::query_as("SELECT password FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0))
    }

    /// Stored password hash for a user key, if the user exists.
    pub async fn password_hash_by_key(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> = sqlx::query_as("SELECT password FROM users WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0))
    }

    /// Update the display name and email address.
    pub async fn update_profile(
        &self,
        key: &str,
        name: &str,
        email: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET name = ?, email = ? WHERE key = ?")
            .bind(name)
            .bind(email)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update name, email and level, as done by an administrator.
    pub async fn update(
        &self,
        key: &str,
        name: &str,
        email: &str,
        level: UserLevel,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET name = ?, email = ?, level = ? WHERE key = ?")
            .bind(name)
            .bind(email)
            .bind(level.as_i64())
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_password(&self, key: &str, password_hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET password = ? WHERE key = ?")
            .bind(password_hash)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user together with every session it owns, so no session is
    /// ever left pointing at a missing user.
    pub async fn delete(&self, key: &str) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM sessions WHERE user_key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM users WHERE key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// List all users ordered by username.
    pub async fn list(&self) -> Result<Vec<User>, sqlx::Error> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT key, username, name, email, level FROM users ORDER BY username",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }
}
