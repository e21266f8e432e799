//! Configuration handling for TableSync

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Load configuration from a TOML file
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path).map_err(|e| {
        Error::ConfigError(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    from_toml_str(&config_str)
}

/// Parse configuration from a TOML string
pub fn from_toml_str(config_str: &str) -> Result<Config> {
    let config: Config = toml::from_str(config_str)
        .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))?;

    Ok(config)
}

/// Represents the complete TableSync configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    pub logging: Option<LoggingConfig>,
}

/// Database connection configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Dialect identifier: `mysql`, `postgres` (or `pgsql`/`postgresql`), `sqlite`
    pub driver: String,
    pub url: String,
    pub pool_size: Option<u32>,
    pub timeout_seconds: Option<u64>,
    /// Postgres schema to introspect and create tables in
    pub schema: Option<String>,
}

impl DatabaseConfig {
    pub fn pool_size(&self) -> u32 {
        self.pool_size.unwrap_or(5)
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds.unwrap_or(30)
    }

    pub fn schema(&self) -> &str {
        self.schema.as_deref().unwrap_or("public")
    }
}

/// Synchronization behaviour
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncConfig {
    /// Render and log statements without executing them
    #[serde(default)]
    pub dry_run: bool,
    /// Wrap execution in a transaction where the dialect supports transactional DDL
    #[serde(default = "default_true")]
    pub use_transaction: bool,
    #[serde(default = "default_string_size")]
    pub default_string_size: u32,
    #[serde(default = "default_charset")]
    pub default_charset: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            use_transaction: true,
            default_string_size: default_string_size(),
            default_charset: default_charset(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_string_size() -> u32 {
    256
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub stdout: bool,
}

fn default_format() -> String {
    "text".to_string()
}
