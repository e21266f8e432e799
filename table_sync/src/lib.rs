//! TableSync: keeps a database schema in line with tables declared in Rust
//!
//! Tables are declared as structs with `#[derive(SyncTable)]`. A run reads the
//! live schema, compares it with the declarations and applies the additive
//! DDL needed to close the gap. Nothing is ever dropped.

extern crate self as table_sync;

pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod models;
pub mod schema;
pub mod utils;

use std::sync::Arc;

use indexmap::IndexMap;

// Re-export main types for easier access
pub use config::Config;
pub use db::connection::DatabaseConnection;
pub use dialect::{Dialect, DialectRegistry};
pub use error::{Error, Result};
pub use models::{ModelRegistry, SyncTable, TableDefinition};
pub use schema::{Schema, SyncTask};
pub use table_sync_macros::SyncTable;

use db::executor::SqlExecutor;

/// Connect using the configuration file at `config_path`
pub async fn init(config_path: &str) -> Result<TableSync> {
    let config = config::load_from_file(config_path)?;
    TableSync::connect(config).await
}

/// Outcome of a synchronization run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Statements rendered for the run, in execution order
    pub statements: Vec<String>,
    pub executed: usize,
    pub dry_run: bool,
    /// Live columns no model declares, per table
    pub abandoned_columns: IndexMap<String, Vec<String>>,
}

/// Runs schema synchronization against one database
pub struct TableSync {
    config: Config,
    connection: DatabaseConnection,
    dialect: Arc<dyn Dialect>,
    models: ModelRegistry,
}

impl TableSync {
    /// Open the configured database and pick its dialect from the built-in registry
    pub async fn connect(config: Config) -> Result<Self> {
        let connection = DatabaseConnection::connect(&config.database).await?;
        let registry = DialectRegistry::from_config(&config.database);
        Self::new(config, connection, &registry)
    }

    /// Use an existing connection, with the dialect matching it taken from `registry`
    pub fn new(
        config: Config,
        connection: DatabaseConnection,
        registry: &DialectRegistry,
    ) -> Result<Self> {
        let dialect = registry
            .get(connection.dialect_name())
            .ok_or_else(|| Error::UnknownDialect(connection.dialect_name().to_string()))?;

        Ok(Self {
            config,
            connection,
            dialect,
            models: ModelRegistry::new(),
        })
    }

    /// Declare a table
    pub fn register<T: SyncTable>(&mut self) -> Result<()> {
        self.models.register::<T>()
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn models_mut(&mut self) -> &mut ModelRegistry {
        &mut self.models
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// Schema described by the registered models
    pub fn declared_schema(&self) -> Result<Schema> {
        self.models.to_schema(self.dialect.as_ref(), &self.config.sync)
    }

    /// Schema read from the live database
    pub async fn actual_schema(&self) -> Result<Schema> {
        let schema = self.dialect.load_schema(&self.connection).await?;
        tracing::debug!(dialect = self.dialect.name(), tables = schema.len(), "loaded live schema");
        Ok(schema)
    }

    /// Changes needed to bring the database in line with the models
    pub async fn plan(&self) -> Result<SyncTask> {
        let declared = self.declared_schema()?;
        let actual = self.actual_schema().await?;
        Ok(schema::diff::compare(&declared, &actual))
    }

    /// Statements for a task, in execution order
    pub fn render(&self, task: &SyncTask) -> Result<Vec<String>> {
        self.dialect.render_sync(task)
    }

    /// Execute statements, inside a transaction when enabled and supported
    pub async fn apply(&self, statements: &[String]) -> Result<usize> {
        let executor = SqlExecutor::new(self.connection.clone());

        if self.config.sync.use_transaction && self.dialect.supports_transactional_ddl() {
            executor.execute_in_transaction(statements).await
        } else {
            executor.execute_batch(statements).await
        }
    }

    /// Plan, render and apply in one go
    pub async fn sync(&self) -> Result<SyncReport> {
        let dry_run = self.config.sync.dry_run;
        tracing::info!(
            dialect = self.dialect.name(),
            tables = self.models.len(),
            dry_run,
            "starting schema sync"
        );

        let task = self.plan().await?;
        if task.is_empty() {
            tracing::info!("database schema is already in sync with models");
            return Ok(SyncReport {
                dry_run,
                abandoned_columns: task.abandoned_columns,
                ..SyncReport::default()
            });
        }

        let statements = self.render(&task)?;

        if dry_run {
            for (i, statement) in statements.iter().enumerate() {
                tracing::info!(step = i + 1, sql = %statement, "statement (dry run)");
            }
            return Ok(SyncReport {
                statements,
                executed: 0,
                dry_run,
                abandoned_columns: task.abandoned_columns,
            });
        }

        let executed = self.apply(&statements).await?;
        tracing::info!(executed, "schema sync finished");

        Ok(SyncReport {
            statements,
            executed,
            dry_run,
            abandoned_columns: task.abandoned_columns,
        })
    }
}
