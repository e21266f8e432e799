//! PostgreSQL dialect

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::{FromRow, Pool, Postgres};

use crate::db::connection::DatabaseConnection;
use crate::dialect::{
    attach_indexes, canonical_type, ensure_index_columns, ensure_table_name, escape_literal,
    generic_parts, group_index_rows, quoted_columns, varchar, Dialect, IndexColumnRow,
};
use crate::error::{Error, Result};
use crate::schema::types::{Column, Index, Nullability, Schema, Table};

/// PostgreSQL dialect bound to one schema
#[derive(Debug, Clone)]
pub struct PostgresDialect {
    schema: String,
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new("public")
    }
}

impl PostgresDialect {
    pub fn new(schema: &str) -> Self {
        Self {
            schema: schema.to_string(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn column_definition(&self, column: &Column) -> String {
        let mut parts = vec![self.quote_identifier(&column.name), column.data_type.clone()];

        if column.is_auto_increment() {
            parts.push("GENERATED BY DEFAULT AS IDENTITY".to_string());
        } else if let Some(default) = column.default_sql() {
            parts.push(format!("DEFAULT {}", default));
        }
        parts.push(column.nullability.as_sql().to_string());

        parts.join(" ")
    }

    fn column_comment_sql(&self, column: &Column) -> String {
        let comment = if column.comment.is_empty() {
            "NULL".to_string()
        } else {
            format!("'{}'", escape_literal(&column.comment))
        };

        format!(
            "COMMENT ON COLUMN {}.{} IS {}",
            self.table_name(&column.table_name),
            self.quote_identifier(&column.name),
            comment
        )
    }
}

#[derive(FromRow)]
struct TableRow {
    table_name: String,
    table_comment: String,
}

#[derive(FromRow)]
struct ColumnRow {
    table_name: String,
    column_name: String,
    udt_name: String,
    char_length: Option<i32>,
    numeric_precision: Option<i32>,
    numeric_scale: Option<i32>,
    is_nullable: String,
    column_default: Option<String>,
    column_comment: String,
}

#[derive(FromRow)]
struct PrimaryKeyRow {
    table_name: String,
    column_name: String,
}

#[derive(FromRow)]
struct IndexRow {
    table_name: String,
    index_name: String,
    column_name: String,
    seq_in_index: i64,
    is_unique: bool,
}

static TYPE_CAST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"::[A-Za-z_][\w\s."\[\]]*$"#).expect("valid regex"));

/// Strip casts and drop defaults that are not user declared
fn normalize_default(raw: Option<String>) -> Option<String> {
    let raw = raw?;
    let mut value = raw.trim().to_string();
    while TYPE_CAST.is_match(&value) {
        value = TYPE_CAST.replace(&value, "").trim().to_string();
    }
    if value.starts_with('(') && value.ends_with(')') && !value.contains(',') {
        value = value[1..value.len() - 1].trim().to_string();
        while TYPE_CAST.is_match(&value) {
            value = TYPE_CAST.replace(&value, "").trim().to_string();
        }
    }

    if value.is_empty() || value.eq_ignore_ascii_case("null") || value.starts_with("nextval(") {
        None
    } else {
        Some(value)
    }
}

fn native_type(row: &ColumnRow) -> String {
    match (row.udt_name.as_str(), row.char_length) {
        ("varchar", Some(len)) | ("bpchar", Some(len)) => format!("{}({})", row.udt_name, len),
        ("numeric", _) => match (row.numeric_precision, row.numeric_scale) {
            (Some(precision), Some(scale)) => format!("numeric({},{})", precision, scale),
            _ => "numeric".to_string(),
        },
        _ => row.udt_name.clone(),
    }
}

async fn load(pool: &Pool<Postgres>, schema_name: &str) -> Result<Schema> {
    let sql = r#"
        SELECT
            c.relname::text AS table_name,
            COALESCE(obj_description(c.oid, 'pg_class'), '')::text AS table_comment
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1 AND c.relkind IN ('r', 'p')
        ORDER BY c.relname
    "#;
    let table_rows = sqlx::query_as::<_, TableRow>(sql)
        .bind(schema_name)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::schema_load("reading tables", e))?;

    let sql = r#"
        SELECT
            c.table_name::text AS table_name,
            c.column_name::text AS column_name,
            c.udt_name::text AS udt_name,
            c.character_maximum_length::int4 AS char_length,
            c.numeric_precision::int4 AS numeric_precision,
            c.numeric_scale::int4 AS numeric_scale,
            c.is_nullable::text AS is_nullable,
            c.column_default::text AS column_default,
            COALESCE(
                col_description(format('%I.%I', c.table_schema, c.table_name)::regclass, c.ordinal_position::int),
                ''
            )::text AS column_comment
        FROM information_schema.columns c
        JOIN information_schema.tables t
          ON t.table_schema = c.table_schema AND t.table_name = c.table_name
        WHERE c.table_schema = $1 AND t.table_type = 'BASE TABLE'
        ORDER BY c.table_name, c.ordinal_position
    "#;
    let column_rows = sqlx::query_as::<_, ColumnRow>(sql)
        .bind(schema_name)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::schema_load("reading columns", e))?;

    let sql = r#"
        SELECT
            t.relname::text AS table_name,
            a.attname::text AS column_name
        FROM pg_index i
        JOIN pg_class t ON t.oid = i.indrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(i.indkey)
        WHERE n.nspname = $1 AND i.indisprimary
    "#;
    let primary_key_rows = sqlx::query_as::<_, PrimaryKeyRow>(sql)
        .bind(schema_name)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::schema_load("reading primary keys", e))?;

    let sql = r#"
        SELECT
            t.relname::text AS table_name,
            ic.relname::text AS index_name,
            a.attname::text AS column_name,
            array_position(i.indkey::int2[], a.attnum)::int8 AS seq_in_index,
            i.indisunique AS is_unique
        FROM pg_index i
        JOIN pg_class t ON t.oid = i.indrelid
        JOIN pg_class ic ON ic.oid = i.indexrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(i.indkey)
        WHERE n.nspname = $1 AND NOT i.indisprimary
        ORDER BY t.relname, ic.relname, seq_in_index
    "#;
    let index_rows = sqlx::query_as::<_, IndexRow>(sql)
        .bind(schema_name)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::schema_load("reading indexes", e))?;

    let mut schema = Schema::new();
    for row in table_rows {
        let mut table = Table::new(&row.table_name);
        table.comment = row.table_comment;
        schema.add_table(table);
    }

    for row in column_rows {
        let data_type = native_type(&row);
        let Some(table) = schema.tables.get_mut(&row.table_name) else {
            continue;
        };
        let mut column = Column::new(&row.column_name, &data_type);
        column.nullability = if row.is_nullable == "YES" {
            Nullability::Null
        } else {
            Nullability::NotNull
        };
        column.default = normalize_default(row.column_default);
        column.comment = row.column_comment;
        table.add_column(column);
    }

    for row in primary_key_rows {
        if let Some(column) = schema
            .tables
            .get_mut(&row.table_name)
            .and_then(|table| table.columns.iter_mut().find(|c| c.name == row.column_name))
        {
            column.primary_key = true;
        }
    }

    let rows = index_rows
        .into_iter()
        .map(|row| IndexColumnRow {
            table_name: row.table_name,
            index_name: row.index_name,
            column_name: row.column_name,
            seq_in_index: row.seq_in_index,
            unique: row.is_unique,
        })
        .collect();
    attach_indexes(&mut schema, group_index_rows(rows));

    Ok(schema)
}

#[async_trait]
impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn load_schema(&self, connection: &DatabaseConnection) -> Result<Schema> {
        match connection {
            DatabaseConnection::Postgres(pool) => load(pool, &self.schema).await,
            other => Err(Error::SchemaLoadError(format!(
                "postgres dialect cannot read a {} connection",
                other.dialect_name()
            ))),
        }
    }

    fn map_type(&self, declared: &str, size: Option<&str>) -> String {
        let canonical = canonical_type(declared);

        if let Some(("Vec", inner)) = generic_parts(&canonical) {
            if inner == "u8" {
                return "bytea".to_string();
            }
            let element = self.map_type(inner, size);
            // Unknown element types have no array form.
            if element == inner {
                return declared.trim().to_string();
            }
            // Array columns report no element length or precision.
            let element = element.split('(').next().unwrap_or_default().trim();
            return format!("_{}", element);
        }

        let base = generic_parts(&canonical).map_or(canonical.as_str(), |(head, _)| head);
        match base {
            "String" | "str" | "char" => varchar(size),
            "bool" => "bool".to_string(),
            "i8" | "u8" | "i16" => "int2".to_string(),
            "u16" | "i32" => "int4".to_string(),
            "u32" | "i64" | "u64" | "isize" | "usize" => "int8".to_string(),
            "f32" => "float4".to_string(),
            "f64" => "float8".to_string(),
            "NaiveDateTime" => "timestamp".to_string(),
            "DateTime" => "timestamptz".to_string(),
            "NaiveDate" => "date".to_string(),
            "NaiveTime" => "time".to_string(),
            "Uuid" => "uuid".to_string(),
            "Value" => "jsonb".to_string(),
            "Decimal" => "numeric(20,6)".to_string(),
            _ => declared.trim().to_string(),
        }
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn table_name(&self, table: &str) -> String {
        format!("{}.{}", self.quote_identifier(&self.schema), self.quote_identifier(table))
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

        if !table.comment.is_empty() {
            statements.push(format!(
                "COMMENT ON TABLE {} IS '{}'",
                self.table_name(&table.name),
                escape_literal(&table.comment)
            ));
        }
        for column in table.columns.iter().filter(|c| !c.comment.is_empty()) {
            let mut column = column.clone();
            column.table_name = table.name.clone();
            statements.push(self.column_comment_sql(&column));
        }

        Ok(statements)
    }

    fn add_column_sql(&self, column: &Column) -> Result<Vec<String>> {
        ensure_table_name(column)?;
        let mut statements = vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.table_name(&column.table_name),
            self.column_definition(column)
        )];
        if !column.comment.is_empty() {
            statements.push(self.column_comment_sql(column));
        }

        Ok(statements)
    }

    fn alter_column_sql(&self, column: &Column) -> Result<Vec<String>> {
        ensure_table_name(column)?;
        let name = self.quote_identifier(&column.name);

        let nullability = match column.nullability {
            Nullability::NotNull => format!("ALTER COLUMN {} SET NOT NULL", name),
            Nullability::Null => format!("ALTER COLUMN {} DROP NOT NULL", name),
        };
        let default = match column.default_sql() {
            Some(default) => format!("ALTER COLUMN {} SET DEFAULT {}", name, default),
            None => format!("ALTER COLUMN {} DROP DEFAULT", name),
        };

        let mut clauses = vec![
            format!(
                "ALTER COLUMN {} TYPE {} USING {}::{}",
                name, column.data_type, name, column.data_type
            ),
            nullability,
        ];
        // Identity columns reject an explicit default.
        if !column.is_auto_increment() {
            clauses.push(default);
        }

        Ok(vec![
            format!(
                "ALTER TABLE {} {}",
                self.table_name(&column.table_name),
                clauses.join(", ")
            ),
            self.column_comment_sql(column),
        ])
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

    fn drop_index_sql(&self, index: &Index) -> String {
        format!(
            "DROP INDEX IF EXISTS {}.{}",
            self.quote_identifier(&self.schema),
            self.quote_identifier(&index.name)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::types_match;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn reported_column(udt_name: &str, char_length: Option<i32>) -> ColumnRow {
        ColumnRow {
            table_name: "item".to_string(),
            column_name: "value".to_string(),
            udt_name: udt_name.to_string(),
            char_length,
            numeric_precision: None,
            numeric_scale: None,
            is_nullable: "YES".to_string(),
            column_default: None,
            column_comment: String::new(),
        }
    }

    #[rstest]
    #[case("Vec<String>", reported_column("_varchar", None))]
    #[case("Vec<i64>", reported_column("_int8", None))]
    #[case("Vec<Decimal>", reported_column("_numeric", None))]
    #[case("String", reported_column("varchar", Some(256)))]
    #[case("DateTime<Utc>", reported_column("timestamptz", None))]
    fn test_mapped_type_matches_reported_type(#[case] declared: &str, #[case] reported: ColumnRow) {
        let mapped = PostgresDialect::default().map_type(declared, Some("256"));

        assert!(
            types_match(&native_type(&reported), &mapped),
            "{} mapped to {} but is reported as {}",
            declared,
            mapped,
            native_type(&reported)
        );
    }

    #[rstest]
    #[case("String", Some("64"), "varchar(64)")]
    #[case("i8", None, "int2")]
    #[case("u8", None, "int2")]
    #[case("i16", None, "int2")]
    #[case("u16", None, "int4")]
    #[case("i32", None, "int4")]
    #[case("u32", None, "int8")]
    #[case("i64", None, "int8")]
    #[case("u64", None, "int8")]
    #[case("f32", None, "float4")]
    #[case("f64", None, "float8")]
    #[case("bool", None, "bool")]
    #[case("chrono::DateTime<chrono::Utc>", None, "timestamptz")]
    #[case("Vec<u8>", None, "bytea")]
    #[case("Vec<i32>", None, "_int4")]
    #[case("Option<Vec<String>>", Some("16"), "_varchar")]
    #[case("Vec<rust_decimal::Decimal>", None, "_numeric")]
    #[case("citext", None, "citext")]
    fn test_map_type(#[case] declared: &str, #[case] size: Option<&str>, #[case] expected: &str) {
        assert_eq!(PostgresDialect::default().map_type(declared, size), expected);
    }

    #[rstest]
    #[case(Some("'active'::character varying"), Some("'active'"))]
    #[case(Some("0"), Some("0"))]
    #[case(Some("'-1'::integer"), Some("'-1'"))]
    #[case(Some("('{}'::text[])"), Some("'{}'"))]
    #[case(Some("nextval('user_id_seq'::regclass)"), None)]
    #[case(Some("NULL::character varying"), None)]
    #[case(None, None)]
    fn test_normalize_default(#[case] raw: Option<&str>, #[case] expected: Option<&str>) {
        assert_eq!(
            normalize_default(raw.map(str::to_string)),
            expected.map(str::to_string)
        );
    }

    #[test]
    fn test_create_table_with_comments_and_index() {
        let mut table = Table::new("user");
        table.comment = "users".to_string();
        table.add_column(Column::new("id", "int8").primary_key());
        table.add_column(Column::new("username", "varchar(64)").with_comment("login"));
        table.add_index(Index::new("uk_username", &["username"], true));

        let sql = PostgresDialect::default().create_table_sql(&table).unwrap();

        assert_eq!(
            sql,
            vec![
                "CREATE TABLE \"public\".\"user\" (\n  \
                 \"id\" int8 GENERATED BY DEFAULT AS IDENTITY not null,\n  \
                 \"username\" varchar(64) null,\n  \
                 PRIMARY KEY (\"id\")\n)"
                    .to_string(),
                "CREATE UNIQUE INDEX \"uk_username\" ON \"public\".\"user\" (\"username\")".to_string(),
                "COMMENT ON TABLE \"public\".\"user\" IS 'users'".to_string(),
                "COMMENT ON COLUMN \"public\".\"user\".\"username\" IS 'login'".to_string(),
            ]
        );
    }

    #[test]
    fn test_alter_column_sets_every_attribute() {
        let mut column = Column::new("status", "varchar(32)")
            .not_null()
            .with_default("'active'");
        column.table_name = "user".to_string();

        let sql = PostgresDialect::new("app").alter_column_sql(&column).unwrap();

        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"app\".\"user\" ALTER COLUMN \"status\" TYPE varchar(32) USING \"status\"::varchar(32), \
                 ALTER COLUMN \"status\" SET NOT NULL, ALTER COLUMN \"status\" SET DEFAULT 'active'"
                    .to_string(),
                "COMMENT ON COLUMN \"app\".\"user\".\"status\" IS NULL".to_string(),
            ]
        );
    }
}
