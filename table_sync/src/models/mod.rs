//! Models module for TableSync
//!
//! This module holds declared table definitions and the registry that turns
//! them into a declared schema.

pub mod definition;
pub mod registry;

// Re-export key types
pub use definition::{FieldDefinition, SyncTable, TableDefinition};
pub use registry::ModelRegistry;
