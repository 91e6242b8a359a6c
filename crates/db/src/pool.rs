//! Postgres connection pool.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::DbError;

/// Type alias for the shared Postgres pool used by [`crate::PgStore`].
pub type DbPool = PgPool;

/// Connection settings for [`create_pool`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub database_url: String,
    /// Pool ceiling.
    pub max_connections: u32,
    /// How long a caller waits for a free connection before failing.
    pub acquire_timeout: Duration,
}

impl PoolSettings {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }
}

/// Open a connection pool with the given settings.
pub async fn create_pool(settings: &PoolSettings) -> Result<DbPool, DbError> {
    info!(
        max_connections = settings.max_connections,
        "connecting to pipeline database"
    );
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .connect(&settings.database_url)
        .await?;
    Ok(pool)
}

/// Apply the embedded migrations from `./migrations` at the workspace root
/// (`workflows`, `pipelines`, `jobs`).
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    info!("applying pipeline schema migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}
