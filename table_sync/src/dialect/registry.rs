//! Dialect registry
//!
//! Built once at startup and only read afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::dialect::{Dialect, MySqlDialect, PostgresDialect, SqliteDialect};

/// Resolve aliases to the identifier a dialect is registered under
pub fn canonical_dialect_id(id: &str) -> String {
    let id = id.trim().to_lowercase();
    match id.as_str() {
        "pgsql" | "postgresql" | "pg" => "postgres".to_string(),
        "sqlite3" => "sqlite".to_string(),
        _ => id,
    }
}

/// Registry of available dialects
pub struct DialectRegistry {
    dialects: HashMap<String, Arc<dyn Dialect>>,
}

impl DialectRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            dialects: HashMap::new(),
        }
    }

    /// Create a registry with every built-in dialect, Postgres bound to `public`
    pub fn with_defaults() -> Self {
        Self::with_postgres_schema("public")
    }

    /// Create a registry with every built-in dialect for a database configuration
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::with_postgres_schema(config.schema())
    }

    fn with_postgres_schema(schema: &str) -> Self {
        let mut registry = Self::new();

        registry.register("mysql", Arc::new(MySqlDialect::new()));
        registry.register("postgres", Arc::new(PostgresDialect::new(schema)));
        registry.register("sqlite", Arc::new(SqliteDialect::new()));

        registry
    }

    /// Register a dialect under an identifier, replacing any previous one
    pub fn register(&mut self, id: &str, dialect: Arc<dyn Dialect>) {
        let id = canonical_dialect_id(id);
        tracing::info!(dialect = %id, "registering dialect");
        self.dialects.insert(id, dialect);
    }

    /// Get a dialect by identifier or alias
    pub fn get(&self, id: &str) -> Option<Arc<dyn Dialect>> {
        let dialect = self.dialects.get(&canonical_dialect_id(id)).cloned();
        if dialect.is_none() {
            tracing::warn!(dialect = %id, "dialect not found in registry");
        }
        dialect
    }

    /// List all registered dialect identifiers, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.dialects.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Check if a dialect is registered
    pub fn has(&self, id: &str) -> bool {
        self.dialects.contains_key(&canonical_dialect_id(id))
    }
}

impl Default for DialectRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
