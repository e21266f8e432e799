//! Declared table definitions
//!
//! A [`TableDefinition`] is the raw, dialect-free description of a table as
//! written in code: field names, Rust types and `ddl` tag strings. The
//! [`ModelRegistry`](super::ModelRegistry) turns definitions into a schema.

use serde::{Deserialize, Serialize};

use crate::utils::naming::{column_name_for, table_name_for};

/// A type whose fields describe a table
///
/// Usually implemented with `#[derive(SyncTable)]`.
pub trait SyncTable {
    fn table_definition() -> TableDefinition;
}

/// Declared table, before type mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Name of the declaring type
    pub name: String,
    /// Explicit table name, overriding the snake_case form of `name`
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub charset: Option<String>,
    pub fields: Vec<FieldDefinition>,
}

impl TableDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table_name: None,
            comment: String::new(),
            charset: None,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, rust_type: &str, ddl: &str) -> Self {
        self.fields.push(FieldDefinition::new(name, rust_type, ddl));
        self
    }

    /// Table name the definition maps to
    pub fn resolved_table_name(&self) -> String {
        match self.table_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => table_name_for(&self.name),
        }
    }
}

/// Declared field: name, Rust type and its `ddl` tag string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub rust_type: String,
    #[serde(default)]
    pub ddl: String,
}

impl FieldDefinition {
    pub fn new(name: &str, rust_type: &str, ddl: &str) -> Self {
        Self {
            name: name.to_string(),
            rust_type: rust_type.to_string(),
            ddl: ddl.to_string(),
        }
    }

    /// Column name the field maps to
    pub fn column_name(&self) -> String {
        column_name_for(&self.name)
    }
}
