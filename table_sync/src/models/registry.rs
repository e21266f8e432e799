//! Model registry for TableSync
//!
//! Collects declared table definitions and builds the declared schema from
//! them for a given dialect.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;

use crate::config::SyncConfig;
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::models::definition::{SyncTable, TableDefinition};
use crate::schema::types::{Column, DdlTags, Index, Nullability, Schema, Table};

/// Registry of declared tables, kept in registration order
#[derive(Debug, Default, Clone)]
pub struct ModelRegistry {
    definitions: IndexMap<String, TableDefinition>,
}

impl ModelRegistry {
    /// Create a new model registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type implementing [`SyncTable`]
    pub fn register<T: SyncTable>(&mut self) -> Result<()> {
        self.register_definition(T::table_definition())
    }

    /// Register a definition; each table may only be declared once
    pub fn register_definition(&mut self, definition: TableDefinition) -> Result<()> {
        let table_name = definition.resolved_table_name();
        if let Some(existing) = self.definitions.get(&table_name) {
            return Err(Error::ModelRegistrationError(format!(
                "table {} is declared by both {} and {}",
                table_name, existing.name, definition.name
            )));
        }

        tracing::debug!(model = %definition.name, table = %table_name, "registered model");
        self.definitions.insert(table_name, definition);
        Ok(())
    }

    /// Register every definition in a YAML or JSON file, returning how many were read
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        let definitions: Vec<TableDefinition> =
            match path.extension().and_then(|ext| ext.to_str()) {
                Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                _ => {
                    return Err(Error::ModelRegistrationError(format!(
                        "unsupported model file {}, expected .yaml, .yml or .json",
                        path.display()
                    )))
                }
            };

        let count = definitions.len();
        for definition in definitions {
            self.register_definition(definition)?;
        }
        Ok(count)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &TableDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Build the declared schema, mapping types for `dialect`
    pub fn to_schema(&self, dialect: &dyn Dialect, config: &SyncConfig) -> Result<Schema> {
        let mut schema = Schema::new();

        for (table_name, definition) in &self.definitions {
            schema.add_table(build_table(table_name, definition, dialect, config)?);
        }

        Ok(schema)
    }
}

fn build_table(
    table_name: &str,
    definition: &TableDefinition,
    dialect: &dyn Dialect,
    config: &SyncConfig,
) -> Result<Table> {
    let mut table = Table::new(table_name);
    table.comment = definition.comment.clone();
    table.charset = definition
        .charset
        .clone()
        .or_else(|| Some(config.default_charset.clone()));

    let default_size = config.default_string_size.to_string();
    let mut indexes: IndexMap<String, Index> = IndexMap::new();

    for field in &definition.fields {
        let tags = DdlTags::parse(&field.ddl);
        let name = field.column_name();

        if table.column(&name).is_some() {
            return Err(Error::ModelRegistrationError(format!(
                "column {} is declared twice on {}",
                name, table_name
            )));
        }

        let size = tags.size.as_deref().unwrap_or(&default_size);
        let data_type = match tags.type_.as_deref().map(str::trim) {
            Some(explicit) if !explicit.is_empty() => explicit.to_string(),
            _ => dialect.map_type(&field.rust_type, Some(size)),
        };

        let column = Column {
            name: name.clone(),
            table_name: table_name.to_string(),
            data_type,
            nullability: if tags.not_null || tags.primary_key {
                Nullability::NotNull
            } else {
                Nullability::Null
            },
            default: tags.default.clone(),
            comment: tags.comment.clone().unwrap_or_default(),
            primary_key: tags.primary_key,
            size: tags.size.clone(),
            tags: tags.clone(),
        };

        if let Some(value) = &tags.index {
            add_to_index(&mut indexes, index_name("idx_", value, &name), &name, false);
        }
        if let Some(value) = &tags.unique_index {
            add_to_index(&mut indexes, index_name("uk_", value, &name), &name, true);
        }

        table.add_column(column);
    }

    for (_, index) in indexes {
        table.add_index(index);
    }

    Ok(table)
}

/// `idx_<column>` for a bare tag, `idx_<name>` for a named one
fn index_name(prefix: &str, value: &str, column: &str) -> String {
    let value = value.trim();
    if value.is_empty() || value == "true" {
        format!("{}{}", prefix, column)
    } else {
        format!("{}{}", prefix, value)
    }
}

fn add_to_index(indexes: &mut IndexMap<String, Index>, name: String, column: &str, unique: bool) {
    indexes
        .entry(name.clone())
        .or_insert_with(|| Index {
            name,
            unique,
            columns: Vec::new(),
            table_name: String::new(),
        })
        .columns
        .push(column.to_string());
}
