//! Dialect drivers
//!
//! Each dialect knows how to read the live schema of one engine, how to map
//! declared Rust types onto that engine's native types, and how to render a
//! [`SyncTask`] into statements the engine accepts.

pub mod mysql;
pub mod postgres;
pub mod rebuild;
pub mod registry;
pub mod sqlite;

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use rebuild::{RebuildStep, TableRebuild};
pub use registry::DialectRegistry;
pub use sqlite::SqliteDialect;

use async_trait::async_trait;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::db::connection::DatabaseConnection;
use crate::error::{Error, Result};
use crate::schema::types::{Column, Index, Schema, SyncTask, Table};

/// String size used when a declaration does not carry one
pub const DEFAULT_STRING_SIZE: &str = "256";

/// Engine-specific schema loading, type mapping and DDL rendering
#[async_trait]
pub trait Dialect: Send + Sync {
    /// Identifier the dialect is registered under
    fn name(&self) -> &'static str;

    /// Introspect the live schema. Any failing query fails the whole load.
    async fn load_schema(&self, connection: &DatabaseConnection) -> Result<Schema>;

    /// Map a declared Rust type onto a native column type. Unknown types pass through.
    fn map_type(&self, declared: &str, size: Option<&str>) -> String;

    /// Whether DDL can be rolled back inside a transaction
    fn supports_transactional_ddl(&self) -> bool;

    /// Quote a table, column or index name
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Qualified, quoted table name
    fn table_name(&self, table: &str) -> String {
        self.quote_identifier(table)
    }

    fn create_table_sql(&self, table: &Table) -> Result<Vec<String>>;

    fn add_column_sql(&self, column: &Column) -> Result<Vec<String>>;

    fn alter_column_sql(&self, column: &Column) -> Result<Vec<String>>;

    fn create_index_sql(&self, index: &Index) -> Result<Vec<String>>;

    fn drop_index_sql(&self, index: &Index) -> String {
        format!("DROP INDEX IF EXISTS {}", self.quote_identifier(&index.name))
    }

    fn rename_table_sql(&self, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.table_name(from),
            self.quote_identifier(to)
        )
    }

    /// Render a task as CreateTable, AddColumn, AlterColumn, AddIndex
    fn render_sync(&self, task: &SyncTask) -> Result<Vec<String>> {
        let mut statements = Vec::new();

        for table in &task.create_table {
            statements.extend(self.create_table_sql(table)?);
        }
        for column in &task.add_column {
            statements.extend(self.add_column_sql(column)?);
        }
        for column in &task.alter_column {
            statements.extend(self.alter_column_sql(column)?);
        }
        for index in &task.add_index {
            statements.extend(self.create_index_sql(index)?);
        }

        Ok(statements)
    }
}

/// Escape a string literal body by doubling single quotes
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

pub(crate) fn quoted_columns(dialect: &dyn Dialect, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| dialect.quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn ensure_table_name(column: &Column) -> Result<()> {
    if column.table_name.is_empty() {
        return Err(Error::RenderError(format!(
            "column {} has no owning table",
            column.name
        )));
    }
    Ok(())
}

pub(crate) fn ensure_index_columns(index: &Index) -> Result<()> {
    if index.columns.is_empty() {
        return Err(Error::RenderError(format!(
            "index {} on {} has no columns",
            index.name, index.table_name
        )));
    }
    if index.table_name.is_empty() {
        return Err(Error::RenderError(format!("index {} has no owning table", index.name)));
    }
    Ok(())
}

static REFERENCE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^&\s*('\w+\s+)?(mut\s+)?").expect("valid regex"));

/// Canonical spelling of a declared Rust type
///
/// Whitespace, references, `Option`/`Box` wrappers and leading path segments
/// are removed, so `Option < chrono::NaiveDateTime >` becomes `NaiveDateTime`.
pub fn canonical_type(declared: &str) -> String {
    let without_ref = REFERENCE_PREFIX.replace(declared.trim(), "");
    let mut ty: String = without_ref.chars().filter(|c| !c.is_whitespace()).collect();

    loop {
        ty = strip_path(&ty);
        match generic_parts(&ty) {
            Some(("Option", inner)) | Some(("Box", inner)) => ty = inner.to_string(),
            _ => break,
        }
    }

    ty
}

/// `Vec<u8>` splits into `("Vec", "u8")`
pub fn generic_parts(ty: &str) -> Option<(&str, &str)> {
    let open = ty.find('<')?;
    let inner = ty[open + 1..].strip_suffix('>')?;
    Some((&ty[..open], inner))
}

fn strip_path(ty: &str) -> String {
    let head_end = ty.find('<').unwrap_or(ty.len());
    match ty[..head_end].rfind("::") {
        Some(pos) => ty[pos + 2..].to_string(),
        None => ty.to_string(),
    }
}

/// `varchar(<size>)`, falling back to the default size
pub(crate) fn varchar(size: Option<&str>) -> String {
    let size = size
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_STRING_SIZE);
    format!("varchar({})", size)
}

/// One row of index introspection, before grouping
#[derive(Debug, Clone)]
pub(crate) struct IndexColumnRow {
    pub table_name: String,
    pub index_name: String,
    pub column_name: String,
    pub seq_in_index: i64,
    pub unique: bool,
}

/// Group per-column index rows into indexes, columns ordered by position
pub(crate) fn group_index_rows(mut rows: Vec<IndexColumnRow>) -> Vec<Index> {
    rows.sort_by_key(|row| row.seq_in_index);

    let mut grouped: IndexMap<(String, String), Index> = IndexMap::new();
    for row in rows {
        grouped
            .entry((row.table_name.clone(), row.index_name.clone()))
            .or_insert_with(|| Index {
                name: row.index_name.clone(),
                unique: row.unique,
                columns: Vec::new(),
                table_name: row.table_name.clone(),
            })
            .columns
            .push(row.column_name);
    }

    let mut indexes: Vec<Index> = grouped.into_values().collect();
    indexes.sort_by(|a, b| (&a.table_name, &a.name).cmp(&(&b.table_name, &b.name)));
    indexes
}

/// Attach grouped indexes to the tables they belong to
pub(crate) fn attach_indexes(schema: &mut Schema, indexes: Vec<Index>) {
    for index in indexes {
        if let Some(table) = schema.tables.get_mut(&index.table_name) {
            table.indexes.push(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("String", "String")]
    #[case("Option<String>", "String")]
    #[case("Option < String >", "String")]
    #[case("& 'static str", "str")]
    #[case("&str", "str")]
    #[case("Box<i64>", "i64")]
    #[case("chrono::NaiveDateTime", "NaiveDateTime")]
    #[case("Option<chrono::DateTime<chrono::Utc>>", "DateTime<chrono::Utc>")]
    #[case("std::vec::Vec<u8>", "Vec<u8>")]
    #[case("serde_json::Value", "Value")]
    fn test_canonical_type(#[case] declared: &str, #[case] expected: &str) {
        assert_eq!(canonical_type(declared), expected);
    }

    #[test]
    fn test_group_index_rows_orders_columns_by_position() {
        let row = |index: &str, column: &str, seq: i64| IndexColumnRow {
            table_name: "user".to_string(),
            index_name: index.to_string(),
            column_name: column.to_string(),
            seq_in_index: seq,
            unique: index.starts_with("uk_"),
        };
        let rows = vec![
            row("uk_name_age", "age", 2),
            row("idx_email", "email", 1),
            row("uk_name_age", "name", 1),
        ];

        let indexes = group_index_rows(rows);

        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].name, "idx_email");
        assert!(!indexes[0].unique);
        assert_eq!(indexes[1].name, "uk_name_age");
        assert_eq!(indexes[1].columns, vec!["name".to_string(), "age".to_string()]);
        assert!(indexes[1].unique);
    }

    const CANONICAL_TYPES: &[&str] = &[
        "String", "bool", "i8", "u8", "i16", "u16", "i32", "u32", "i64", "u64", "isize", "usize",
        "f32", "f64", "NaiveDateTime", "DateTime<Utc>", "NaiveDate", "NaiveTime", "Uuid", "Value",
        "Decimal", "Vec<u8>",
    ];

    /// Every canonical type maps the same way twice, and types only share a
    /// native type when they belong to one of `aliases`
    fn assert_mapping_is_stable(dialect: &dyn Dialect, aliases: &[&[&str]]) {
        let mut by_native: IndexMap<String, Vec<&str>> = IndexMap::new();

        for &declared in CANONICAL_TYPES {
            let mapped = dialect.map_type(declared, Some("256"));
            assert_eq!(mapped, dialect.map_type(declared, Some("256")));
            by_native.entry(mapped).or_default().push(declared);
        }

        for (native, declared) in by_native.iter().filter(|(_, d)| d.len() > 1) {
            assert!(
                aliases
                    .iter()
                    .any(|group| declared.iter().all(|d| group.contains(d))),
                "{} share {} on {}",
                declared.join(", "),
                native,
                dialect.name()
            );
        }
    }

    #[test]
    fn test_mysql_mapping_collisions() {
        assert_mapping_is_stable(
            &MySqlDialect::new(),
            &[&["i64", "isize"], &["u64", "usize"], &["NaiveDateTime", "DateTime<Utc>"]],
        );
    }

    #[test]
    fn test_postgres_mapping_collisions() {
        assert_mapping_is_stable(
            &PostgresDialect::default(),
            &[
                &["i8", "u8", "i16"],
                &["u16", "i32"],
                &["u32", "i64", "u64", "isize", "usize"],
            ],
        );
    }

    #[test]
    fn test_sqlite_mapping_collisions() {
        assert_mapping_is_stable(
            &SqliteDialect::new(),
            &[
                &["i8", "u8", "i16", "u16", "i32", "u32", "i64", "u64", "isize", "usize"],
                &["NaiveDateTime", "DateTime<Utc>"],
            ],
        );
    }

    #[test]
    fn test_varchar_defaults_size() {
        assert_eq!(varchar(None), "varchar(256)");
        assert_eq!(varchar(Some("")), "varchar(256)");
        assert_eq!(varchar(Some("64")), "varchar(64)");
    }
}
