//! Naming utilities for TableSync
//!
//! Declared type and field names are turned into table and column names here.

use inflector::Inflector;

/// Table name for a declaring type: `UserProfile` becomes `user_profile`
pub fn table_name_for(type_name: &str) -> String {
    type_name.trim().to_snake_case()
}

/// Column name for a declared field: `firstName` becomes `first_name`
pub fn column_name_for(field_name: &str) -> String {
    field_name.trim().trim_start_matches("r#").to_snake_case()
}
