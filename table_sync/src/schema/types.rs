//! Type definitions for the dialect-neutral schema model

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A set of tables keyed by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub tables: IndexMap<String, Table>,
    /// Set when the source cannot report comments reliably, so comment drift
    /// must not cause alterations.
    #[serde(default)]
    pub no_comment: bool,
}

impl Schema {
    /// Create a new empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty schema whose comments are not comparable
    pub fn without_comments() -> Self {
        Self {
            tables: IndexMap::new(),
            no_comment: true,
        }
    }

    /// Add a table, replacing any table with the same name
    pub fn add_table(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Represents a database table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub comment: String,
    /// Character set, only meaningful for dialects that have one
    #[serde(default)]
    pub charset: Option<String>,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub indexes: Vec<Index>,
}

impl Table {
    /// Create a new table with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            comment: String::new(),
            charset: None,
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Add a column, stamping it with this table's name
    pub fn add_column(&mut self, mut column: Column) {
        column.table_name = self.name.clone();
        self.columns.push(column);
    }

    /// Add an index, stamping it with this table's name
    pub fn add_index(&mut self, mut index: Index) {
        index.table_name = self.name.clone();
        self.indexes.push(index);
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Names of the primary key columns in declaration order
    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Column nullability, rendered verbatim as an SQL fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Nullability {
    #[default]
    #[serde(rename = "null")]
    Null,
    #[serde(rename = "not null")]
    NotNull,
}

impl Nullability {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Nullability::Null => "null",
            Nullability::NotNull => "not null",
        }
    }

    pub fn is_not_null(&self) -> bool {
        matches!(self, Nullability::NotNull)
    }
}

/// Represents a table column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default)]
    pub table_name: String,
    /// Native, dialect-resolved type
    pub data_type: String,
    #[serde(default)]
    pub nullability: Nullability,
    /// Literal SQL default fragment
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub tags: DdlTags,
}

impl Column {
    /// Create a nullable column with the given native type
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            table_name: String::new(),
            data_type: data_type.to_string(),
            nullability: Nullability::Null,
            default: None,
            comment: String::new(),
            primary_key: false,
            size: None,
            tags: DdlTags::default(),
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullability = Nullability::NotNull;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullability = Nullability::NotNull;
        self
    }

    pub fn with_default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = comment.to_string();
        self
    }

    /// Default fragment, with an empty string treated as absent
    pub fn default_sql(&self) -> Option<&str> {
        self.default.as_deref().filter(|d| !d.is_empty())
    }

    /// Primary key named `id` with an integer type
    pub fn is_auto_increment(&self) -> bool {
        self.primary_key && self.name == "id" && is_integer_type(&self.data_type)
    }
}

/// Per-column directives written as `key[:value];key[:value]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlTags {
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub not_null: bool,
    /// `Some("true")` when the tag carries no explicit name
    #[serde(default)]
    pub unique_index: Option<String>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl DdlTags {
    /// Parse a tag string such as `size:32;not null;default:'active';uniqueIndex`
    ///
    /// Keys are matched case-insensitively and a bare key means `true`. Only
    /// the first `:` separates key and value, so values may contain colons.
    /// Unrecognised keys are ignored.
    pub fn parse(raw: &str) -> Self {
        let mut tags = DdlTags::default();

        for part in raw.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = match part.split_once(':') {
                Some((k, v)) => (k.trim(), v.trim().to_string()),
                None => (part, "true".to_string()),
            };

            let normalized: String = key
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '_')
                .flat_map(char::to_lowercase)
                .collect();

            match normalized.as_str() {
                "primarykey" => tags.primary_key = value != "false",
                "notnull" => tags.not_null = value != "false",
                "uniqueindex" => tags.unique_index = Some(value),
                "index" => tags.index = Some(value),
                "type" => tags.type_ = Some(value),
                "default" => tags.default = Some(value),
                "size" => tags.size = Some(value),
                "comment" => tags.comment = Some(value),
                _ => {}
            }
        }

        tags
    }
}

/// Represents a table index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    #[serde(default)]
    pub unique: bool,
    pub columns: Vec<String>,
    #[serde(default)]
    pub table_name: String,
}

impl Index {
    pub fn new(name: &str, columns: &[&str], unique: bool) -> Self {
        Self {
            name: name.to_string(),
            unique,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            table_name: String::new(),
        }
    }

    /// Same uniqueness and column sequence
    pub fn same_definition(&self, other: &Index) -> bool {
        self.unique == other.unique && self.columns == other.columns
    }
}

/// Declared and actual definition of a table with altered columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlteredTable {
    pub declared: Table,
    pub actual: Table,
}

/// Additive changes needed to bring an actual schema in line with a declared one
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncTask {
    pub create_table: Vec<Table>,
    pub add_column: Vec<Column>,
    /// Full target definitions, never deltas
    pub alter_column: Vec<Column>,
    pub add_index: Vec<Index>,
    /// Declared and actual definitions of every table gaining or changing
    /// columns, for dialects that rebuild whole tables
    pub altered_tables: IndexMap<String, AlteredTable>,
    /// Live columns no declaration covers, per table; reported, never dropped
    #[serde(default)]
    pub abandoned_columns: IndexMap<String, Vec<String>>,
}

impl SyncTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.create_table.is_empty()
            && self.add_column.is_empty()
            && self.alter_column.is_empty()
            && self.add_index.is_empty()
    }
}

static SPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static SPACE_AROUND_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*([(,])\s*").expect("valid regex"));
static SPACE_BEFORE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\)").expect("valid regex"));
static DISPLAY_WIDTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\d+\)").expect("valid regex"));

const INTEGER_TYPES: &[&str] = &[
    "tinyint", "smallint", "mediumint", "int", "integer", "bigint", "int2", "int4", "int8",
];

fn base_type(data_type: &str) -> String {
    data_type
        .trim()
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Whether the type belongs to the integer family
pub fn is_integer_type(data_type: &str) -> bool {
    INTEGER_TYPES.contains(&base_type(data_type).as_str())
}

fn normalize_type(data_type: &str) -> String {
    let lowered = data_type.trim().to_lowercase();
    let collapsed = SPACE_RUN.replace_all(&lowered, " ");
    let opened = SPACE_AROUND_OPEN.replace_all(&collapsed, "$1");
    let tight = SPACE_BEFORE_CLOSE.replace_all(&opened, ")").into_owned();

    // Integer display widths are cosmetic; character lengths are not.
    if is_integer_type(&tight) {
        DISPLAY_WIDTH.replace_all(&tight, "").into_owned()
    } else {
        tight
    }
}

/// Compare an introspected type against a declared one
pub fn types_match(actual: &str, declared: &str) -> bool {
    normalize_type(actual) == normalize_type(declared)
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Compare defaults, tolerating one layer of single quotes on either side
pub fn defaults_match(actual: Option<&str>, declared: Option<&str>) -> bool {
    let actual = actual.map(str::trim).filter(|d| !d.is_empty());
    let declared = declared.map(str::trim).filter(|d| !d.is_empty());

    match (actual, declared) {
        (None, None) => true,
        (Some(a), Some(d)) => a == d || unquote(a) == unquote(d),
        _ => false,
    }
}
