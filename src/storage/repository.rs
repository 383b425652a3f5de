use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};

use super::{MIGRATION_001_LEDGER, MIGRATION_002_CREDENTIALS};

/// Connection settings for the SQLite backend.
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// How long a statement waits for a competing writer before failing
    pub busy_timeout: Duration,
    /// How long a caller waits for a free pooled connection
    pub acquire_timeout: Duration,
    pub max_connections: u32,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(10),
            max_connections: 8,
        }
    }
}

/// Handle to the database shared by the ledger and the auth gateway.
/// Cloning is cheap: all clones share one connection pool.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database.
    /// With `create` set the database file is created if it doesn't exist.
    pub async fn connect(database_url: &str, options: &StorageOptions, create: bool) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(options.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect_with(connect_options)
            .await
            .context("Failed to connect to database")?;

        Ok(Self::new(pool))
    }

    /// Run database migrations. Safe to run more than once.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_LEDGER)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        sqlx::query(MIGRATION_002_CREDENTIALS)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 002")?;

        Ok(())
    }

    /// Initialize a database (connect, creating it if needed, then migrate).
    pub async fn init(database_url: &str, options: &StorageOptions) -> Result<Self> {
        let repo = Self::connect(database_url, options, true).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Start a database transaction.
    ///
    /// Rolls back when dropped without `commit`, which releases any lock it holds.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .context("Failed to begin transaction")
    }

    /// Borrow a pooled connection for reads outside a transaction.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .context("Failed to acquire database connection")
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Build a SQLite URL for a database file path.
pub fn sqlite_url(path: &str) -> String {
    format!("sqlite:{}", path)
}
