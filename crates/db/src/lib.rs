use std::{str::FromStr, time::Duration};

use sqlx::{
    Error, SqlitePool,
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use thiserror::Error;
use tracing::info;

pub mod models;

#[derive(Debug, Error)]
pub enum DBServiceError {
    #[error(transparent)]
    Database(#[from] Error),
    #[error(transparent)]
    Migrate(#[from] MigrateError),
}

/// Owns the connection pool and applies embedded migrations on startup.
#[derive(Clone)]
pub struct DBService {
    pub pool: SqlitePool,
}

impl DBService {
    pub async fn new(database_url: &str) -> Result<DBService, DBServiceError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;
        info!(database_url, "Database ready");
        Ok(DBService { pool })
    }

    /// Single-connection in-memory database, used by tests across the workspace.
    pub async fn new_in_memory() -> Result<DBService, DBServiceError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // Every connection to `:memory:` is its own database, so the pool must
        // keep exactly one connection alive for the lifetime of the service.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;
        Ok(DBService { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), MigrateError> {
        sqlx::migrate!("./migrations").run(pool).await
    }

    /// Cheap liveness probe used by the health route.
    pub async fn ping(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

/// True when `err` is a UNIQUE constraint violation.
pub fn is_unique_violation(err: &Error) -> bool {
    match err {
        Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// True when `err` is a UNIQUE violation whose message mentions `column`.
///
/// SQLite reports the offending columns as `table.column` in the message.
pub fn is_unique_violation_on(err: &Error, column: &str) -> bool {
    match err {
        Error::Database(db_err) => {
            db_err.is_unique_violation() && db_err.message().contains(column)
        }
        _ => false,
    }
}
