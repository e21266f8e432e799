use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

use table_sync::{config, Config, DatabaseConnection, DialectRegistry, TableSync};

/// Configuration for an in-memory SQLite database
pub fn test_config() -> Config {
    config::from_toml_str(
        r#"
        [database]
        driver = "sqlite"
        url = "sqlite::memory:"

        [sync]
        dry_run = false
        use_transaction = true
        "#,
    )
    .expect("Failed to parse test config")
}

/// A single-connection pool so every query sees the same in-memory database
pub async fn memory_pool() -> Pool<Sqlite> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory sqlite")
}

pub fn client(pool: &Pool<Sqlite>, config: Config) -> TableSync {
    TableSync::new(
        config,
        DatabaseConnection::Sqlite(pool.clone()),
        &DialectRegistry::with_defaults(),
    )
    .expect("sqlite dialect is registered")
}

pub async fn execute(pool: &Pool<Sqlite>, sql: &str) {
    sqlx::query(sql).execute(pool).await.expect(sql);
}
