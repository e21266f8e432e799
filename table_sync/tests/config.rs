//! Loading configuration from disk and connecting with it

use std::io::Write;

use pretty_assertions::assert_eq;
use rstest::rstest;
use tempfile::NamedTempFile;

use table_sync::{config, Error};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = write_config(
        r#"
        [database]
        driver = "postgresql"
        url = "postgres://localhost/app"
        pool_size = 2
        schema = "inventory"

        [sync]
        dry_run = true
        default_string_size = 128

        [logging]
        level = "debug"
        format = "json"
        "#,
    );

    let config = config::load_from_file(file.path()).unwrap();

    assert_eq!(config.database.pool_size(), 2);
    assert_eq!(config.database.timeout_seconds(), 30);
    assert_eq!(config.database.schema(), "inventory");
    assert!(config.sync.dry_run);
    assert!(config.sync.use_transaction);
    assert_eq!(config.sync.default_string_size, 128);
    assert_eq!(config.sync.default_charset, "utf8mb4");

    let logging = config.logging.unwrap();
    assert_eq!(logging.level, "debug");
    assert_eq!(logging.format, "json");
    assert!(logging.stdout);
}

#[test]
fn test_missing_file_is_config_error() {
    let err = config::load_from_file("/nonexistent/table_sync.toml").unwrap_err();
    assert!(matches!(err, Error::ConfigError(_)));
}

#[rstest]
#[case("sqlite")]
#[case("SQLite3")]
#[tokio::test]
async fn test_init_picks_dialect_from_driver(#[case] driver: &str) {
    let file = write_config(&format!(
        "[database]\ndriver = \"{}\"\nurl = \"sqlite::memory:\"\n",
        driver
    ));
    let path = file.path().to_str().unwrap().to_string();

    let client = table_sync::init(&path).await.unwrap();

    assert_eq!(client.dialect().name(), "sqlite");
    assert!(client.actual_schema().await.unwrap().is_empty());
    client.connection().close().await;
}

#[tokio::test]
async fn test_unknown_driver_is_rejected() {
    let file = write_config("[database]\ndriver = \"oracle\"\nurl = \"oracle://db\"\n");
    let path = file.path().to_str().unwrap().to_string();

    assert!(table_sync::init(&path).await.is_err());
}
