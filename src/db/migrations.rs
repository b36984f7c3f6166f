//! Versioned schema migrations.
//!
//! The `schema_migrations` table is an append-only log. Its highest version is
//! the current schema version. Version 1 is the base schema and is recorded
//! without running anything. Every step moves the schema from
//! `from_version` to `from_version + 1` and must be safe to re-run from the
//! same starting state, since a failed run is resumed from the last recorded
//! version.

use chrono::Utc;
use futures::future::BoxFuture;
use sqlx::sqlite::SqlitePool;
use tracing::{debug, error, info};

/// Layout of the `created` column of the migration log.
const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn log_time() -> String {
    Utc::now().format(LOG_TIME_FORMAT).to_string()
}

/// Async step operating on the pool.
pub type StepFn = for<'a> fn(&'a SqlitePool) -> BoxFuture<'a, Result<(), sqlx::Error>>;

#[derive(Clone, Copy)]
pub struct MigrationStep {
    pub from_version: i64,
    pub description: &'static str,
    pub apply: StepFn,
}

/// Built-in migration steps.
pub const STEPS: &[MigrationStep] = &[
    MigrationStep {
        from_version: 1,
        description: "add shoppers and assign the default shopper to purchases",
        apply: add_shoppers,
    },
    MigrationStep {
        from_version: 2,
        description: "index sessions by expiry",
        apply: index_session_expiry,
    },
];

/// The step that applies to `current`, if any.
pub fn next_step(current: i64, steps: &[MigrationStep]) -> Option<&MigrationStep> {
    steps.iter().find(|step| step.from_version == current)
}

/// Applies migration steps in order and records each in the log.
pub struct MigrationRunner {
    pool: SqlitePool,
    steps: Vec<MigrationStep>,
}

impl MigrationRunner {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_steps(pool, STEPS.to_vec())
    }

    pub fn with_steps(pool: SqlitePool, steps: Vec<MigrationStep>) -> Self {
        Self { pool, steps }
    }

    async fn log_exists(&self) -> Result<bool, sqlx::Error> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0 > 0)
    }

    /// Highest recorded version, or 0 when the log does not exist yet.
    pub async fn current_version(&self) -> Result<i64, sqlx::Error> {
        if !self.log_exists().await? {
            return Ok(0);
        }
        let version: (Option<i64>,) = sqlx::query_as("SELECT MAX(version) FROM schema_migrations")
            .fetch_one(&self.pool)
            .await?;
        Ok(version.0.unwrap_or(0))
    }

    /// Number of log entries, 0 when the log does not exist.
    pub async fn count_entries(&self) -> Result<i64, sqlx::Error> {
        if !self.log_exists().await? {
            return Ok(0);
        }
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM schema_migrations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Create the log together with the baseline entry.
    async fn create_log(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "CREATE TABLE schema_migrations (
                version INTEGER NOT NULL,
                created TEXT NOT NULL
            )",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("INSERT INTO schema_migrations (version, created) VALUES (1, ?)")
            .bind(log_time())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn record(&self, version: i64) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO schema_migrations (version, created) VALUES (?, ?)")
            .bind(version)
            .bind(log_time())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Bring the schema up to date. Returns the resulting version.
    ///
    /// A failing step aborts the run; the log keeps the last completed version.
    pub async fn run(&self) -> Result<i64, sqlx::Error> {
        if !self.log_exists().await? {
            info!("Creating migration log with baseline version 1");
            self.create_log().await?;
        }

        let mut current = self.current_version().await?;
        info!(version = current, "Current database version");

        while let Some(step) = next_step(current, &self.steps) {
            let target = step.from_version + 1;
            info!(from = current, to = target, step = step.description, "Migrating database");

            if let Err(e) = (step.apply)(&self.pool).await {
                error!(from = current, to = target, error = %e, "Migration step failed");
                return Err(e);
            }

            if let Err(e) = self.record(target).await {
                error!(version = target, error = %e, "Failed to record finished migration");
                return Err(e);
            }
            current = target;
        }

        debug!(version = current, "No migration from this version");
        info!(version = current, "Database is up to date");
        Ok(current)
    }
}

/// Default shopper assigned to purchases that predate shoppers.
pub const DEFAULT_SHOPPER_KEY: &str = "1";

fn add_shoppers(pool: &SqlitePool) -> BoxFuture<'_, Result<(), sqlx::Error>> {
    Box::pin(async move {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS shoppers (
                key TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                image TEXT NOT NULL DEFAULT ''
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO shoppers (key, name, image) VALUES (?, 'N/A', '')")
            .bind(DEFAULT_SHOPPER_KEY)
            .execute(pool)
            .await?;

        let has_column: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM pragma_table_info('purchases') WHERE name = 'shopper'",
        )
        .fetch_one(pool)
        .await?;
        if has_column.0 == 0 {
            sqlx::query("ALTER TABLE purchases ADD COLUMN shopper TEXT")
                .execute(pool)
                .await?;
        }

        let updated =
            sqlx::query("UPDATE purchases SET shopper = ? WHERE shopper IS NULL OR shopper = ''")
                .bind(DEFAULT_SHOPPER_KEY)
                .execute(pool)
                .await?;
        info!(count = updated.rows_affected(), "Assigned default shopper to purchases");
        Ok(())
    })
}

fn index_session_expiry(pool: &SqlitePool) -> BoxFuture<'_, Result<(), sqlx::Error>> {
    Box::pin(async move {
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires)")
            .execute(pool)
            .await?;
        Ok(())
    })
}
