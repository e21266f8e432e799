//! Database connection handling
//!
//! This module establishes the sqlx pool for the configured dialect.

use std::time::Duration;

use sqlx::{
    mysql::MySqlPoolOptions, postgres::PgPoolOptions, sqlite::SqlitePoolOptions, MySql, Pool,
    Postgres, Sqlite,
};

use crate::config::DatabaseConfig;
use crate::dialect::registry::canonical_dialect_id;
use crate::error::{Error, Result};

/// A pooled connection to one of the supported engines
#[derive(Debug, Clone)]
pub enum DatabaseConnection {
    Postgres(Pool<Postgres>),
    MySql(Pool<MySql>),
    Sqlite(Pool<Sqlite>),
}

impl DatabaseConnection {
    /// Create a new database connection from configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds());
        let pool_size = config.pool_size();

        match canonical_dialect_id(&config.driver).as_str() {
            "postgres" => {
                let pool = PgPoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(timeout)
                    .connect(&config.url)
                    .await?;

                Ok(DatabaseConnection::Postgres(pool))
            }
            "mysql" => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(timeout)
                    .connect(&config.url)
                    .await?;

                Ok(DatabaseConnection::MySql(pool))
            }
            "sqlite" => {
                // Every connection to an in-memory database opens a fresh one.
                let pool_size = if config.url.contains(":memory:") { 1 } else { pool_size };
                let pool = SqlitePoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(timeout)
                    .connect(&config.url)
                    .await?;

                Ok(DatabaseConnection::Sqlite(pool))
            }
            _ => Err(Error::DatabaseError(format!(
                "Unsupported database driver: {}",
                config.driver
            ))),
        }
    }

    /// Dialect identifier of the live connection
    pub fn dialect_name(&self) -> &'static str {
        match self {
            DatabaseConnection::Postgres(_) => "postgres",
            DatabaseConnection::MySql(_) => "mysql",
            DatabaseConnection::Sqlite(_) => "sqlite",
        }
    }

    /// Close the underlying pool
    pub async fn close(&self) {
        match self {
            DatabaseConnection::Postgres(pool) => pool.close().await,
            DatabaseConnection::MySql(pool) => pool.close().await,
            DatabaseConnection::Sqlite(pool) => pool.close().await,
        }
    }
}

impl From<Pool<Sqlite>> for DatabaseConnection {
    fn from(pool: Pool<Sqlite>) -> Self {
        DatabaseConnection::Sqlite(pool)
    }
}

impl From<Pool<Postgres>> for DatabaseConnection {
    fn from(pool: Pool<Postgres>) -> Self {
        DatabaseConnection::Postgres(pool)
    }
}

impl From<Pool<MySql>> for DatabaseConnection {
    fn from(pool: Pool<MySql>) -> Self {
        DatabaseConnection::MySql(pool)
    }
}
