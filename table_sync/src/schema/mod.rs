//! Schema module for TableSync
//!
//! This module holds the dialect-neutral schema model and the differ.

pub mod diff;
pub mod types;

// Re-export key types
pub use diff::{abandoned_columns, compare, ColumnChange};
pub use types::{
    AlteredTable, Column, DdlTags, Index, Nullability, Schema, SyncTask, Table,
};
