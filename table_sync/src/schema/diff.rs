//! Schema difference calculator
//!
//! Compares a declared schema against an actual one and collects the additive
//! changes into a [`SyncTask`]. Nothing that exists only in the actual schema
//! is ever scheduled for removal; undeclared columns are only reported.

use std::collections::HashMap;

use crate::schema::types::{
    defaults_match, types_match, AlteredTable, Column, Index, Schema, SyncTask, Table,
};

/// Attribute of a column that differs between declared and actual
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnChange {
    Type,
    Nullability,
    Default,
    Comment,
}

/// Compare the actual column against the declared one
pub fn column_changes(actual: &Column, declared: &Column, compare_comment: bool) -> Vec<ColumnChange> {
    let mut changes = Vec::new();

    if !types_match(&actual.data_type, &declared.data_type) {
        changes.push(ColumnChange::Type);
    }
    if actual.nullability != declared.nullability {
        changes.push(ColumnChange::Nullability);
    }
    if !defaults_match(actual.default.as_deref(), declared.default.as_deref()) {
        changes.push(ColumnChange::Default);
    }
    if compare_comment && actual.comment.trim() != declared.comment.trim() {
        changes.push(ColumnChange::Comment);
    }

    changes
}

/// Produce the task that brings `actual` in line with `declared`
///
/// Tables are visited in declaration order, so the task is deterministic.
pub fn compare(declared: &Schema, actual: &Schema) -> SyncTask {
    let mut task = SyncTask::new();
    let compare_comment = !actual.no_comment;

    for (table_name, declared_table) in &declared.tables {
        let actual_table = match actual.tables.get(table_name) {
            Some(table) => table,
            None => {
                task.create_table.push(stamped(declared_table));
                continue;
            }
        };

        let actual_columns: HashMap<&str, &Column> = actual_table
            .columns
            .iter()
            .map(|col| (col.name.as_str(), col))
            .collect();

        for declared_column in &declared_table.columns {
            match actual_columns.get(declared_column.name.as_str()) {
                None => {
                    let mut column = declared_column.clone();
                    column.table_name = table_name.clone();
                    task.add_column.push(column);

                    task.altered_tables
                        .entry(table_name.clone())
                        .or_insert_with(|| AlteredTable {
                            declared: stamped(declared_table),
                            actual: actual_table.clone(),
                        });
                }
                Some(actual_column) => {
                    let changes = column_changes(actual_column, declared_column, compare_comment);
                    if changes.is_empty() {
                        continue;
                    }

                    tracing::debug!(
                        table = %table_name,
                        column = %declared_column.name,
                        changes = ?changes,
                        "column differs from declaration"
                    );

                    let mut column = declared_column.clone();
                    column.table_name = table_name.clone();
                    task.alter_column.push(column);

                    task.altered_tables
                        .entry(table_name.clone())
                        .or_insert_with(|| AlteredTable {
                            declared: stamped(declared_table),
                            actual: actual_table.clone(),
                        });
                }
            }
        }

        for declared_index in &declared_table.indexes {
            match actual_table.index(&declared_index.name) {
                None => {
                    let mut index = declared_index.clone();
                    index.table_name = table_name.clone();
                    task.add_index.push(index);
                }
                Some(actual_index) => warn_on_index_drift(table_name, actual_index, declared_index),
            }
        }

        let abandoned = abandoned_columns(declared_table, actual_table);
        if !abandoned.is_empty() {
            tracing::warn!(
                table = %table_name,
                columns = ?abandoned,
                "found columns no model declares; leaving them in place"
            );
            task.abandoned_columns.insert(table_name.clone(), abandoned);
        }
    }

    task
}

fn warn_on_index_drift(table_name: &str, actual: &Index, declared: &Index) {
    if !actual.same_definition(declared) {
        tracing::warn!(
            table = %table_name,
            index = %declared.name,
            declared_columns = ?declared.columns,
            actual_columns = ?actual.columns,
            declared_unique = declared.unique,
            actual_unique = actual.unique,
            "index definition differs from declaration; leaving it unchanged"
        );
    }
}

/// Columns of the live table that the declaration does not mention
pub fn abandoned_columns(declared: &Table, actual: &Table) -> Vec<String> {
    actual
        .columns
        .iter()
        .filter(|column| declared.column(&column.name).is_none())
        .map(|column| column.name.clone())
        .collect()
}

/// Copy of a table with every column and index carrying the table's name
fn stamped(table: &Table) -> Table {
    let mut table = table.clone();
    let name = table.name.clone();
    for column in &mut table.columns {
        column.table_name = name.clone();
    }
    for index in &mut table.indexes {
        index.table_name = name.clone();
    }
    table
}
