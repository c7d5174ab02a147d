use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use thiserror::Error;

use crate::repository::{StateStore, StatementSink, Storage};

mod mapping;
mod migrate;
mod state_repo;
mod statement_repo;

/// Pool settings for the progress database.
///
/// State saves and statement appends both arrive from background tasks;
/// a writer that finds the database locked waits up to `busy_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressDbOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub busy_timeout: Duration,
}

impl Default for ProgressDbOptions {
    fn default() -> Self {
        Self {
            max_connections: 4,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// `SQLite` home for state documents and the statement log.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteRepository {
    /// Opens the progress database with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the URL is invalid or no connection can
    /// be established.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        Self::connect_with(database_url, ProgressDbOptions::default()).await
    }

    /// Opens the progress database in WAL mode with the given pool settings.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the URL is invalid or no connection can
    /// be established.
    pub async fn connect_with(
        database_url: &str,
        options: ProgressDbOptions,
    ) -> Result<Self, SqliteInitError> {
        let connect = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(options.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect_with(connect)
            .await?;
        tracing::debug!(
            max_connections = options.max_connections,
            busy_timeout_ms = options.busy_timeout.as_millis(),
            "progress database opened"
        );
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the state and statement tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// One `SQLite` database serving both state documents and statements.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        repo.migrate().await?;
        let states: Arc<dyn StateStore> = Arc::new(repo.clone());
        let statements: Arc<dyn StatementSink> = Arc::new(repo);
        Ok(Self { states, statements })
    }
}
