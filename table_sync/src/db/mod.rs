//! Database module for TableSync
//!
//! This module handles database connections and statement execution.

pub mod connection;
pub mod executor;

// Re-export key types
pub use connection::DatabaseConnection;
pub use executor::{execute_statements, SqlExecutor, StatementRunner};
