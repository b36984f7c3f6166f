mod migrations;
mod session;
mod user;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use migrations::{MigrationRunner, MigrationStep, STEPS, StepFn, next_step};
pub use session::{Session, SessionStore};
pub use user::{NewUser, User, UserLevel, UserStore};

/// Timestamp layout used for every persisted date-time (always UTC).
pub const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%SZ";

/// Format a UTC time for storage. Sub-second precision is dropped.
pub fn to_db_time(time: DateTime<Utc>) -> String {
    time.format(DB_TIME_FORMAT).to_string()
}

/// Parse a stored timestamp.
pub fn from_db_time(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, DB_TIME_FORMAT).map(|t| t.and_utc())
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path and bring its schema up to date.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let db = Self::connect(path).await?;
        db.ensure_base_schema().await?;
        MigrationRunner::new(db.pool.clone()).run().await?;
        Ok(db)
    }

    /// Open the connection pool without touching the schema.
    pub async fn connect(path: &str) -> Result<Self, sqlx::Error> {
        let pool = if path == ":memory:" {
            // Every SQLite connection to :memory: is a separate database, so
            // keep exactly one connection alive for the pool's lifetime.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&format!("sqlite:{}?mode=rwc", path))
                .await?
        };

        Ok(Self { pool })
    }

    /// Create the version 1 tables if they do not exist yet.
    pub async fn ensure_base_schema(&self) -> Result<(), sqlx::Error> {
        let queries = [
            "CREATE TABLE IF NOT EXISTS users (
                key TEXT PRIMARY KEY NOT NULL,
                username TEXT UNIQUE NOT NULL COLLATE NOCASE,
                name TEXT NOT NULL DEFAULT '',
                email TEXT NOT NULL DEFAULT '',
                level INTEGER NOT NULL DEFAULT 0,
                password TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS sessions (
                key TEXT PRIMARY KEY NOT NULL,
                user_key TEXT NOT NULL REFERENCES users(key),
                created TEXT NOT NULL,
                expires TEXT NOT NULL,
                remember_me_token TEXT,
                remember_me_expires TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_sessions_user_key ON sessions(user_key)",
            "CREATE TABLE IF NOT EXISTS categories (
                key TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                color TEXT NOT NULL DEFAULT ''
            )",
            "CREATE TABLE IF NOT EXISTS venues (
                key TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                address TEXT NOT NULL DEFAULT ''
            )",
            "CREATE TABLE IF NOT EXISTS purchases (
                key TEXT PRIMARY KEY NOT NULL,
                date TEXT NOT NULL,
                sum TEXT NOT NULL,
                category TEXT REFERENCES categories(key),
                venue TEXT REFERENCES venues(key),
                created TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        ];

        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(query).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the session store.
    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(self.pool.clone())
    }

    /// Get a migration runner with the built-in steps.
    pub fn migrations(&self) -> MigrationRunner {
        MigrationRunner::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
