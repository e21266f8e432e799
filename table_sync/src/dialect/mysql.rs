//! MySQL dialect
//!
//! Introspects through `information_schema`. MySQL commits every DDL
//! statement implicitly, so a run can never be rolled back.

use async_trait::async_trait;
use sqlx::{FromRow, MySql, Pool};

use crate::db::connection::DatabaseConnection;
use crate::dialect::{
    attach_indexes, canonical_type, ensure_index_columns, ensure_table_name, escape_literal,
    generic_parts, group_index_rows, quoted_columns, varchar, Dialect, IndexColumnRow,
};
use crate::error::{Error, Result};
use crate::schema::types::{Column, Index, Nullability, Schema, Table};

#[derive(Debug, Default, Clone)]
pub struct MySqlDialect;

impl MySqlDialect {
    pub fn new() -> Self {
        Self
    }

    fn column_definition(&self, column: &Column) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            column.data_type.clone(),
            column.nullability.as_sql().to_string(),
        ];

        if let Some(default) = column.default_sql() {
            parts.push(format!("DEFAULT {}", default));
        }
        if column.is_auto_increment() {
            parts.push("AUTO_INCREMENT".to_string());
        }
        if !column.comment.is_empty() {
            parts.push(format!("COMMENT '{}'", escape_literal(&column.comment)));
        }

        parts.join(" ")
    }
}

#[derive(FromRow)]
struct TableRow {
    table_name: String,
    table_comment: String,
    table_collation: String,
}

#[derive(FromRow)]
struct ColumnRow {
    table_name: String,
    column_name: String,
    column_type: String,
    is_nullable: String,
    column_default: Option<String>,
    column_comment: String,
    column_key: String,
}

#[derive(FromRow)]
struct StatisticsRow {
    table_name: String,
    index_name: String,
    column_name: String,
    seq_in_index: i64,
    non_unique: i64,
}

const STRING_TYPES: &[&str] = &[
    "char", "varchar", "binary", "varbinary", "tinytext", "text", "mediumtext", "longtext", "enum",
    "set",
];

/// MySQL reports `DEFAULT ''` as an empty string; MariaDB reports a missing
/// default on a nullable column as the bare word `NULL`.
fn normalize_default(raw: Option<String>, column_type: &str) -> Option<String> {
    let raw = raw?;
    if raw.trim().eq_ignore_ascii_case("null") {
        return None;
    }
    if raw.is_empty() {
        let base = column_type
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or_default()
            .to_lowercase();
        return STRING_TYPES.contains(&base.as_str()).then(|| "''".to_string());
    }
    Some(raw)
}

async fn load(pool: &Pool<MySql>) -> Result<Schema> {
    let database: Option<String> = sqlx::query_scalar("SELECT CAST(DATABASE() AS CHAR)")
        .fetch_one(pool)
        .await
        .map_err(|e| Error::schema_load("selecting current database", e))?;
    let database = database
        .ok_or_else(|| Error::SchemaLoadError("no database selected on connection".to_string()))?;

    let sql = r#"
        SELECT
            CAST(table_name AS CHAR) AS table_name,
            CAST(COALESCE(table_comment, '') AS CHAR) AS table_comment,
            CAST(COALESCE(table_collation, '') AS CHAR) AS table_collation
        FROM information_schema.tables
        WHERE table_schema = ? AND table_type = 'BASE TABLE'
        ORDER BY table_name
    "#;
    let table_rows = sqlx::query_as::<_, TableRow>(sql)
        .bind(&database)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::schema_load("reading tables", e))?;

    let sql = r#"
        SELECT
            CAST(table_name AS CHAR) AS table_name,
            CAST(column_name AS CHAR) AS column_name,
            CAST(column_type AS CHAR) AS column_type,
            CAST(is_nullable AS CHAR) AS is_nullable,
            CAST(column_default AS CHAR) AS column_default,
            CAST(COALESCE(column_comment, '') AS CHAR) AS column_comment,
            CAST(COALESCE(column_key, '') AS CHAR) AS column_key
        FROM information_schema.columns
        WHERE table_schema = ?
        ORDER BY table_name, ordinal_position
    "#;
    let column_rows = sqlx::query_as::<_, ColumnRow>(sql)
        .bind(&database)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::schema_load("reading columns", e))?;

    let sql = r#"
        SELECT
            CAST(table_name AS CHAR) AS table_name,
            CAST(index_name AS CHAR) AS index_name,
            CAST(column_name AS CHAR) AS column_name,
            CAST(seq_in_index AS SIGNED) AS seq_in_index,
            CAST(non_unique AS SIGNED) AS non_unique
        FROM information_schema.statistics
        WHERE table_schema = ? AND index_name <> 'PRIMARY'
        ORDER BY table_name, index_name, seq_in_index
    "#;
    let statistics_rows = sqlx::query_as::<_, StatisticsRow>(sql)
        .bind(&database)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::schema_load("reading indexes", e))?;

    let mut schema = Schema::new();
    for row in table_rows {
        let mut table = Table::new(&row.table_name);
        table.comment = row.table_comment;
        table.charset = row
            .table_collation
            .split('_')
            .next()
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        schema.add_table(table);
    }

    for row in column_rows {
        let Some(table) = schema.tables.get_mut(&row.table_name) else {
            continue;
        };
        let mut column = Column::new(&row.column_name, &row.column_type);
        column.nullability = if row.is_nullable.eq_ignore_ascii_case("YES") {
            Nullability::Null
        } else {
            Nullability::NotNull
        };
        column.default = normalize_default(row.column_default, &row.column_type);
        column.comment = row.column_comment;
        column.primary_key = row.column_key == "PRI";
        table.add_column(column);
    }

    let rows = statistics_rows
        .into_iter()
        .map(|row| IndexColumnRow {
            table_name: row.table_name,
            index_name: row.index_name,
            column_name: row.column_name,
            seq_in_index: row.seq_in_index,
            unique: row.non_unique == 0,
        })
        .collect();
    attach_indexes(&mut schema, group_index_rows(rows));

    Ok(schema)
}

#[async_trait]
impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn load_schema(&self, connection: &DatabaseConnection) -> Result<Schema> {
        match connection {
            DatabaseConnection::MySql(pool) => load(pool).await,
            other => Err(Error::SchemaLoadError(format!(
                "mysql dialect cannot read a {} connection",
                other.dialect_name()
            ))),
        }
    }

    fn map_type(&self, declared: &str, size: Option<&str>) -> String {
        let canonical = canonical_type(declared);
        let base = generic_parts(&canonical).map_or(canonical.as_str(), |(head, _)| head);

        match base {
            "String" | "str" | "char" => varchar(size),
            "bool" => "tinyint(1)".to_string(),
            "i8" => "tinyint".to_string(),
            "u8" => "tinyint unsigned".to_string(),
            "i16" => "smallint".to_string(),
            "u16" => "smallint unsigned".to_string(),
            "i32" => "int".to_string(),
            "u32" => "int unsigned".to_string(),
            "i64" | "isize" => "bigint".to_string(),
            "u64" | "usize" => "bigint unsigned".to_string(),
            "f32" => "float".to_string(),
            "f64" => "double".to_string(),
            "NaiveDateTime" | "DateTime" => "datetime".to_string(),
            "NaiveDate" => "date".to_string(),
            "NaiveTime" => "time".to_string(),
            "Uuid" => "char(36)".to_string(),
            "Value" => "json".to_string(),
            "Decimal" => "decimal(20,6)".to_string(),
            "Vec" if canonical == "Vec<u8>" => "blob".to_string(),
            _ => declared.trim().to_string(),
        }
    }

    fn supports_transactional_ddl(&self) -> bool {
        false
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn create_table_sql(&self, table: &Table) -> Result<Vec<String>> {
        let mut lines: Vec<String> = table
            .columns
            .iter()
            .map(|column| self.column_definition(column))
            .collect();

        let primary_key: Vec<String> = table
            .primary_key_columns()
            .into_iter()
            .map(str::to_string)
            .collect();
        if !primary_key.is_empty() {
            lines.push(format!("PRIMARY KEY ({})", quoted_columns(self, &primary_key)));
        }

        for index in &table.indexes {
            ensure_index_columns(index)?;
            let keyword = if index.unique { "UNIQUE KEY" } else { "KEY" };
            lines.push(format!(
                "{} {} ({})",
                keyword,
                self.quote_identifier(&index.name),
                quoted_columns(self, &index.columns)
            ));
        }

        let mut sql = format!(
            "CREATE TABLE {} (\n  {}\n) ENGINE=InnoDB",
            self.table_name(&table.name),
            lines.join(",\n  ")
        );
        if let Some(charset) = table.charset.as_deref().filter(|c| !c.is_empty()) {
            sql.push_str(&format!(" DEFAULT CHARSET={}", charset));
        }
        if !table.comment.is_empty() {
            sql.push_str(&format!(" COMMENT='{}'", escape_literal(&table.comment)));
        }

        Ok(vec![sql])
    }

    fn add_column_sql(&self, column: &Column) -> Result<Vec<String>> {
        ensure_table_name(column)?;
        let mut definition = self.column_definition(column);
        // AUTO_INCREMENT is only accepted on a key column.
        if column.is_auto_increment() {
            definition.push_str(" PRIMARY KEY");
        }

        Ok(vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.table_name(&column.table_name),
            definition
        )])
    }

    fn alter_column_sql(&self, column: &Column) -> Result<Vec<String>> {
        ensure_table_name(column)?;
        Ok(vec![format!(
            "ALTER TABLE {} MODIFY COLUMN {}",
            self.table_name(&column.table_name),
            self.column_definition(column)
        )])
    }

    fn create_index_sql(&self, index: &Index) -> Result<Vec<String>> {
        ensure_index_columns(index)?;
        let keyword = if index.unique { "UNIQUE INDEX" } else { "INDEX" };

        Ok(vec![format!(
            "ALTER TABLE {} ADD {} {} ({})",
            self.table_name(&index.table_name),
            keyword,
            self.quote_identifier(&index.name),
            quoted_columns(self, &index.columns)
        )])
    }

    fn drop_index_sql(&self, index: &Index) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote_identifier(&index.name),
            self.table_name(&index.table_name)
        )
    }
}
