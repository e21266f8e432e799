//! SQLite dialect
//!
//! SQLite cannot change a column's type or constraints in place, so altered
//! tables are rebuilt (see [`TableRebuild`]). It keeps no column comments,
//! which makes every loaded schema comment-blind.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{FromRow, Pool, Sqlite};

use crate::db::connection::DatabaseConnection;
use crate::dialect::rebuild::TableRebuild;
use crate::dialect::{
    attach_indexes, canonical_type, ensure_index_columns, ensure_table_name, generic_parts,
    group_index_rows, quoted_columns, varchar, Dialect, IndexColumnRow,
};
use crate::error::{Error, Result};
use crate::schema::types::{Column, Index, Nullability, Schema, SyncTask, Table};

#[derive(Debug, Default, Clone)]
pub struct SqliteDialect;

impl SqliteDialect {
    pub fn new() -> Self {
        Self
    }

    fn column_definition(&self, column: &Column, inline_primary_key: bool) -> String {
        let mut parts = vec![self.quote_identifier(&column.name), column.data_type.clone()];

        if inline_primary_key {
            parts.push("PRIMARY KEY AUTOINCREMENT".to_string());
        }
        parts.push(column.nullability.as_sql().to_string());
        if let Some(default) = column.default_sql() {
            parts.push(format!("DEFAULT {}", default));
        }

        parts.join(" ")
    }

    fn rebuild_sql(&self, task: &SyncTask, table_name: &str) -> Result<Vec<String>> {
        let altered = task.altered_tables.get(table_name).ok_or_else(|| {
            Error::RenderError(format!(
                "rebuild of {} is missing its table definitions",
                table_name
            ))
        })?;

        tracing::debug!(table = %table_name, "rebuilding table to alter columns");
        TableRebuild::new(self, altered).into_statements()
    }
}

/// `ADD COLUMN` rejects primary keys and `NOT NULL` without a default
fn can_add_in_place(column: &Column) -> bool {
    !column.primary_key && !(column.nullability.is_not_null() && column.default_sql().is_none())
}

#[derive(FromRow)]
struct TableRow {
    table_name: String,
}

#[derive(FromRow)]
struct ColumnRow {
    name: String,
    data_type: String,
    not_null: i64,
    dflt_value: Option<String>,
    pk: i64,
}

#[derive(FromRow)]
struct IndexRow {
    table_name: String,
    index_name: String,
    column_name: Option<String>,
    seqno: i64,
    is_unique: i64,
}

async fn load(pool: &Pool<Sqlite>) -> Result<Schema> {
    let sql = r#"
        SELECT name AS table_name
        FROM sqlite_master
        WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
        ORDER BY name
    "#;
    let table_rows = sqlx::query_as::<_, TableRow>(sql)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::schema_load("reading tables", e))?;

    let mut schema = Schema::without_comments();
    for row in table_rows {
        let sql = r#"
            SELECT name, type AS data_type, "notnull" AS not_null, dflt_value, pk
            FROM pragma_table_info(?1)
            ORDER BY cid
        "#;
        let column_rows = sqlx::query_as::<_, ColumnRow>(sql)
            .bind(&row.table_name)
            .fetch_all(pool)
            .await
            .map_err(|e| Error::schema_load(&format!("reading columns of {}", row.table_name), e))?;

        let mut table = Table::new(&row.table_name);
        for col in column_rows {
            let mut column = Column::new(&col.name, &col.data_type);
            column.nullability = if col.not_null != 0 {
                Nullability::NotNull
            } else {
                Nullability::Null
            };
            column.default = col.dflt_value;
            column.primary_key = col.pk > 0;
            table.add_column(column);
        }
        schema.add_table(table);
    }

    // Only explicitly created indexes; PRIMARY KEY and UNIQUE constraints
    // produce automatic ones that cannot be dropped by name.
    let sql = r#"
        SELECT
            m.name AS table_name,
            il.name AS index_name,
            ii.name AS column_name,
            ii.seqno AS seqno,
            il."unique" AS is_unique
        FROM sqlite_master m
        JOIN pragma_index_list(m.name) il
        JOIN pragma_index_info(il.name) ii
        WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%' AND il.origin = 'c'
        ORDER BY m.name, il.name, ii.seqno
    "#;
    let index_rows = sqlx::query_as::<_, IndexRow>(sql)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::schema_load("reading indexes", e))?;

    let rows = index_rows
        .into_iter()
        .filter_map(|row| {
            Some(IndexColumnRow {
                table_name: row.table_name,
                index_name: row.index_name,
                column_name: row.column_name?,
                seq_in_index: row.seqno,
                unique: row.is_unique != 0,
            })
        })
        .collect();
    attach_indexes(&mut schema, group_index_rows(rows));

    Ok(schema)
}

#[async_trait]
impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn load_schema(&self, connection: &DatabaseConnection) -> Result<Schema> {
        match connection {
            DatabaseConnection::Sqlite(pool) => load(pool).await,
            other => Err(Error::SchemaLoadError(format!(
                "sqlite dialect cannot read a {} connection",
                other.dialect_name()
            ))),
        }
    }

    /// All integer widths share one storage class, and only `integer`
    /// primary keys may autoincrement, so every integer maps to `integer`.
    fn map_type(&self, declared: &str, size: Option<&str>) -> String {
        let canonical = canonical_type(declared);
        let base = generic_parts(&canonical).map_or(canonical.as_str(), |(head, _)| head);

        match base {
            "String" | "str" | "char" => varchar(size),
            "bool" => "boolean".to_string(),
            "i8" | "u8" | "i16" | "u16" | "i32" | "u32" | "i64" | "u64" | "isize" | "usize" => {
                "integer".to_string()
            }
            "f32" => "real".to_string(),
            "f64" => "double".to_string(),
            "NaiveDateTime" | "DateTime" => "datetime".to_string(),
            "NaiveDate" => "date".to_string(),
            "NaiveTime" => "time".to_string(),
            "Uuid" => "varchar(36)".to_string(),
            "Value" => "text".to_string(),
            "Decimal" => "numeric".to_string(),
            "Vec" if canonical == "Vec<u8>" => "blob".to_string(),
            _ => declared.trim().to_string(),
        }
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn create_table_sql(&self, table: &Table) -> Result<Vec<String>> {
        let primary_key = table.primary_key_columns();
        let inline = primary_key.len() == 1
            && table
                .column(primary_key[0])
                .map_or(false, |c| c.is_auto_increment() && c.data_type.eq_ignore_ascii_case("integer"));

        let mut lines: Vec<String> = table
            .columns
            .iter()
            .map(|column| self.column_definition(column, inline && column.primary_key))
            .collect();

        if !primary_key.is_empty() && !inline {
            let primary_key: Vec<String> = primary_key.into_iter().map(str::to_string).collect();
            lines.push(format!("PRIMARY KEY ({})", quoted_columns(self, &primary_key)));
        }

        let mut statements = vec![format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.table_name(&table.name),
            lines.join(",\n  ")
        )];
        for index in &table.indexes {
            let mut index = index.clone();
            index.table_name = table.name.clone();
            statements.extend(self.create_index_sql(&index)?);
        }

        Ok(statements)
    }

    fn add_column_sql(&self, column: &Column) -> Result<Vec<String>> {
        ensure_table_name(column)?;
        Ok(vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.table_name(&column.table_name),
            self.column_definition(column, false)
        )])
    }

    fn alter_column_sql(&self, column: &Column) -> Result<Vec<String>> {
        Err(Error::RenderError(format!(
            "sqlite cannot alter {}.{} in place; it must be rendered as a table rebuild",
            column.table_name, column.name
        )))
    }

    fn create_index_sql(&self, index: &Index) -> Result<Vec<String>> {
        ensure_index_columns(index)?;
        let keyword = if index.unique { "CREATE UNIQUE INDEX" } else { "CREATE INDEX" };

        Ok(vec![format!(
            "{} {} ON {} ({})",
            keyword,
            self.quote_identifier(&index.name),
            self.table_name(&index.table_name),
            quoted_columns(self, &index.columns)
        )])
    }

    /// Tables are rebuilt once, where their first alteration sits, when a
    /// column changes or cannot be added in place. Their added columns and
    /// indexes are part of the recreated table and are not rendered separately.
    fn render_sync(&self, task: &SyncTask) -> Result<Vec<String>> {
        let rebuilt: HashSet<&str> = task
            .alter_column
            .iter()
            .chain(task.add_column.iter().filter(|column| !can_add_in_place(column)))
            .map(|column| column.table_name.as_str())
            .collect();
        let mut statements = Vec::new();

        for table in &task.create_table {
            statements.extend(self.create_table_sql(table)?);
        }
        for column in task
            .add_column
            .iter()
            .filter(|column| !rebuilt.contains(column.table_name.as_str()))
        {
            statements.extend(self.add_column_sql(column)?);
        }

        let mut done: HashSet<&str> = HashSet::new();
        for column in task.alter_column.iter().chain(task.add_column.iter()) {
            let table_name = column.table_name.as_str();
            if rebuilt.contains(table_name) && done.insert(table_name) {
                statements.extend(self.rebuild_sql(task, table_name)?);
            }
        }

        for index in task
            .add_index
            .iter()
            .filter(|index| !rebuilt.contains(index.table_name.as_str()))
        {
            statements.extend(self.create_index_sql(index)?);
        }

        Ok(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{types_match, AlteredTable};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("String", Some("64"), "varchar(64)")]
    #[case("i8", None, "integer")]
    #[case("u32", None, "integer")]
    #[case("i64", None, "integer")]
    #[case("u64", None, "integer")]
    #[case("f32", None, "real")]
    #[case("f64", None, "double")]
    #[case("bool", None, "boolean")]
    #[case("chrono::NaiveDateTime", None, "datetime")]
    #[case("Vec<u8>", None, "blob")]
    #[case("json", None, "json")]
    fn test_map_type(#[case] declared: &str, #[case] size: Option<&str>, #[case] expected: &str) {
        assert_eq!(SqliteDialect::new().map_type(declared, size), expected);
    }

    #[rstest]
    #[case("i64", "integer")]
    #[case("u8", "INTEGER")]
    #[case("String", "varchar(256)")]
    #[case("Uuid", "varchar(36)")]
    #[case("f64", "double")]
    #[case("bool", "boolean")]
    fn test_mapped_type_matches_reported_type(#[case] declared: &str, #[case] reported: &str) {
        let mapped = SqliteDialect::new().map_type(declared, Some("256"));
        assert!(types_match(reported, &mapped), "{} vs {}", reported, mapped);
    }

    #[test]
    fn test_create_table_inlines_autoincrement() {
        let mut table = Table::new("user");
        table.add_column(Column::new("id", "integer").primary_key());
        table.add_column(Column::new("username", "varchar(64)"));

        let sql = SqliteDialect::new().create_table_sql(&table).unwrap();

        assert_eq!(
            sql,
            vec!["CREATE TABLE \"user\" (\n  \
                  \"id\" integer PRIMARY KEY AUTOINCREMENT not null,\n  \
                  \"username\" varchar(64) null\n)"
                .to_string()]
        );
    }

    #[test]
    fn test_create_table_with_composite_key() {
        let mut table = Table::new("membership");
        table.add_column(Column::new("user_id", "integer").primary_key());
        table.add_column(Column::new("group_id", "integer").primary_key());
        table.add_index(Index::new("idx_group_id", &["group_id"], false));

        let sql = SqliteDialect::new().create_table_sql(&table).unwrap();

        assert_eq!(
            sql,
            vec![
                "CREATE TABLE \"membership\" (\n  \
                 \"user_id\" integer not null,\n  \
                 \"group_id\" integer not null,\n  \
                 PRIMARY KEY (\"user_id\", \"group_id\")\n)"
                    .to_string(),
                "CREATE INDEX \"idx_group_id\" ON \"membership\" (\"group_id\")".to_string(),
            ]
        );
    }

    #[test]
    fn test_alteration_renders_one_rebuild_per_table() {
        let mut declared = Table::new("user");
        declared.add_column(Column::new("id", "integer").primary_key());
        declared.add_column(Column::new("name", "varchar(128)").not_null());
        declared.add_column(Column::new("email", "varchar(64)"));
        declared.add_index(Index::new("uk_name", &["name"], true));
        declared.add_index(Index::new("idx_email", &["email"], false));

        let mut actual = Table::new("user");
        actual.add_column(Column::new("id", "integer").primary_key());
        actual.add_column(Column::new("name", "varchar(64)"));
        actual.add_index(Index::new("uk_name", &["name"], true));

        let task = crate::schema::diff::compare(
            &{
                let mut s = Schema::new();
                s.add_table(declared);
                s
            },
            &{
                let mut s = Schema::without_comments();
                s.add_table(actual);
                s
            },
        );
        assert_eq!(task.alter_column.len(), 1);
        assert_eq!(task.add_column.len(), 1);
        assert_eq!(task.add_index.len(), 1);

        let sql = SqliteDialect::new().render_sync(&task).unwrap();

        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"user\" RENAME TO \"user__temp_remove\"".to_string(),
                "DROP INDEX IF EXISTS \"uk_name\"".to_string(),
                "CREATE TABLE \"user\" (\n  \
                 \"id\" integer PRIMARY KEY AUTOINCREMENT not null,\n  \
                 \"name\" varchar(128) not null,\n  \
                 \"email\" varchar(64) null\n)"
                    .to_string(),
                "CREATE UNIQUE INDEX \"uk_name\" ON \"user\" (\"name\")".to_string(),
                "CREATE INDEX \"idx_email\" ON \"user\" (\"email\")".to_string(),
                "INSERT INTO \"user\" (\"id\", \"name\") SELECT \"id\", \"name\" FROM \"user__temp_remove\""
                    .to_string(),
                "DROP TABLE \"user__temp_remove\"".to_string(),
            ]
        );
    }

    #[test]
    fn test_alteration_without_table_context_is_render_error() {
        let mut column = Column::new("name", "varchar(128)");
        column.table_name = "user".to_string();
        let task = SyncTask {
            alter_column: vec![column],
            ..SyncTask::default()
        };

        let err = SqliteDialect::new().render_sync(&task).unwrap_err();
        assert!(matches!(err, Error::RenderError(_)));
    }

    fn adding(column: Column) -> SyncTask {
        let mut actual = Table::new("user");
        actual.add_column(Column::new("id", "integer").primary_key());
        let mut declared = actual.clone();
        declared.add_column(column);

        let mut declared_schema = Schema::new();
        declared_schema.add_table(declared);
        let mut actual_schema = Schema::without_comments();
        actual_schema.add_table(actual);
        crate::schema::diff::compare(&declared_schema, &actual_schema)
    }

    #[test]
    fn test_required_column_without_default_is_added_by_rebuild() {
        let task = adding(Column::new("email", "varchar(64)").not_null());

        let sql = SqliteDialect::new().render_sync(&task).unwrap();

        assert_eq!(sql[0], "ALTER TABLE \"user\" RENAME TO \"user__temp_remove\"");
        assert!(sql.iter().all(|s| !s.contains("ADD COLUMN")));
        assert!(sql
            .iter()
            .any(|s| s.starts_with("CREATE TABLE") && s.contains("\"email\" varchar(64) not null")));
    }

    #[test]
    fn test_required_column_with_default_is_added_in_place() {
        let task = adding(Column::new("email", "varchar(64)").not_null().with_default("''"));

        let sql = SqliteDialect::new().render_sync(&task).unwrap();

        assert_eq!(
            sql,
            vec!["ALTER TABLE \"user\" ADD COLUMN \"email\" varchar(64) not null DEFAULT ''".to_string()]
        );
    }

    #[test]
    fn test_rebuild_of_unindexed_table_has_no_drop_index_step() {
        let mut declared = Table::new("t");
        declared.add_column(Column::new("a", "integer").not_null());
        let mut actual = Table::new("t");
        actual.add_column(Column::new("a", "integer"));
        let column = declared.columns[0].clone();
        let mut task = SyncTask {
            alter_column: vec![column],
            ..SyncTask::default()
        };
        task.altered_tables
            .insert("t".to_string(), AlteredTable { declared, actual });

        let sql = SqliteDialect::new().render_sync(&task).unwrap();

        assert_eq!(sql.len(), 4);
        assert!(sql.iter().all(|s| !s.starts_with("DROP INDEX")));
    }
}
