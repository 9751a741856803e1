use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::{ProvisionerError, Result};

/// Create the shared pool with WAL journaling and run pending migrations.
///
/// Failure here is a startup-time `ConfigurationError`.
#[tracing::instrument(skip(config), fields(max_connections = config.max_connections))]
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| ProvisionerError::ConfigurationError(format!("invalid database url: {e}")))?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .map_err(|e| {
            ProvisionerError::ConfigurationError(format!("database unreachable: {e}"))
        })?;

    run_migrations(&pool).await?;

    info!("Database pool created");
    Ok(pool)
}

/// Single-connection in-memory pool with the schema applied.
///
/// An in-memory SQLite database lives only as long as its connection, so the
/// pool is pinned to one connection that never idles out.
pub async fn create_in_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// Apply the embedded migrations under `migrations/`
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    debug!("Database migrations applied");
    Ok(())
}

pub async fn health_check(pool: &SqlitePool) -> Result<bool> {
    let row = sqlx::query("SELECT 1 as health").fetch_one(pool).await?;
    let health: i64 = row.get("health");
    Ok(health == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_pool_has_schema() {
        let pool = create_in_memory_pool().await.unwrap();
        assert!(health_check(&pool).await.unwrap());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clusters")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_file_pool_is_created_and_migrated() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite:{}", dir.path().join("clusters.db").display()),
            max_connections: 2,
        };

        let pool = create_pool(&config).await.unwrap();
        assert!(health_check(&pool).await.unwrap());
        assert!(dir.path().join("clusters.db").exists());
        pool.close().await;
    }
}
