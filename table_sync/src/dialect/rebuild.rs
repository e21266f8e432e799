//! Table rebuild for engines that cannot alter columns in place
//!
//! A rebuild moves the old table aside, recreates it from the declared
//! definition, copies the rows back and drops the old copy. The steps run
//! once each, in order. An interruption between the rename and the final
//! drop leaves `<table>__temp_remove` behind.

use crate::dialect::{quoted_columns, Dialect};
use crate::error::Result;
use crate::schema::types::{AlteredTable, Table};

/// Suffix of the table the original is moved to during a rebuild
pub const TEMP_TABLE_SUFFIX: &str = "__temp_remove";

/// Position of a rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildStep {
    RenameToTemp,
    DropIndexes,
    CreateTable,
    CopyRows,
    DropTemp,
    Done,
}

impl RebuildStep {
    fn next(self) -> Self {
        match self {
            RebuildStep::RenameToTemp => RebuildStep::DropIndexes,
            RebuildStep::DropIndexes => RebuildStep::CreateTable,
            RebuildStep::CreateTable => RebuildStep::CopyRows,
            RebuildStep::CopyRows => RebuildStep::DropTemp,
            RebuildStep::DropTemp | RebuildStep::Done => RebuildStep::Done,
        }
    }
}

/// Rebuild of a single table
pub struct TableRebuild<'a> {
    dialect: &'a dyn Dialect,
    target: Table,
    actual: Table,
    step: RebuildStep,
}

impl<'a> TableRebuild<'a> {
    /// Plan a rebuild towards the declared definition
    ///
    /// Columns and indexes found only on the live table are carried over
    /// unchanged, so nothing is lost by recreating the table.
    pub fn new(dialect: &'a dyn Dialect, altered: &AlteredTable) -> Self {
        let mut target = altered.declared.clone();

        for column in &altered.actual.columns {
            if target.column(&column.name).is_none() {
                target.add_column(column.clone());
            }
        }
        for index in &altered.actual.indexes {
            if target.index(&index.name).is_none() {
                target.add_index(index.clone());
            }
        }

        Self {
            dialect,
            target,
            actual: altered.actual.clone(),
            step: RebuildStep::RenameToTemp,
        }
    }

    pub fn step(&self) -> RebuildStep {
        self.step
    }

    /// Definition the table is recreated with
    pub fn target(&self) -> &Table {
        &self.target
    }

    pub fn temp_table_name(&self) -> String {
        format!("{}{}", self.target.name, TEMP_TABLE_SUFFIX)
    }

    /// Statements of the current step, then move to the next one
    ///
    /// Yields nothing once the rebuild is done.
    pub fn advance(&mut self) -> Result<Vec<String>> {
        let dialect = self.dialect;
        let temp = self.temp_table_name();

        let statements = match self.step {
            RebuildStep::RenameToTemp => vec![dialect.rename_table_sql(&self.target.name, &temp)],
            RebuildStep::DropIndexes => self
                .actual
                .indexes
                .iter()
                .map(|index| dialect.drop_index_sql(index))
                .collect(),
            RebuildStep::CreateTable => dialect.create_table_sql(&self.target)?,
            RebuildStep::CopyRows => {
                let columns: Vec<String> =
                    self.actual.columns.iter().map(|c| c.name.clone()).collect();
                let columns = quoted_columns(dialect, &columns);
                vec![format!(
                    "INSERT INTO {} ({}) SELECT {} FROM {}",
                    dialect.table_name(&self.target.name),
                    columns,
                    columns,
                    dialect.table_name(&temp)
                )]
            }
            RebuildStep::DropTemp => vec![format!("DROP TABLE {}", dialect.table_name(&temp))],
            RebuildStep::Done => Vec::new(),
        };

        self.step = self.step.next();
        Ok(statements)
    }

    /// Run every remaining step
    pub fn into_statements(mut self) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        while self.step != RebuildStep::Done {
            statements.extend(self.advance()?);
        }
        Ok(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;
    use crate::schema::types::{Column, Index};
    use pretty_assertions::assert_eq;

    fn altered() -> AlteredTable {
        let mut declared = Table::new("user");
        declared.add_column(Column::new("id", "integer").primary_key());
        declared.add_column(Column::new("name", "varchar(128)"));
        declared.add_index(Index::new("uk_name", &["name"], true));

        let mut actual = Table::new("user");
        actual.add_column(Column::new("id", "integer").primary_key());
        actual.add_column(Column::new("name", "varchar(64)"));
        actual.add_column(Column::new("legacy", "text"));
        actual.add_index(Index::new("uk_name", &["name"], true));
        actual.add_index(Index::new("idx_legacy", &["legacy"], false));

        AlteredTable { declared, actual }
    }

    #[test]
    fn test_steps_run_once_in_order() {
        let dialect = SqliteDialect::new();
        let altered = altered();
        let mut rebuild = TableRebuild::new(&dialect, &altered);

        assert_eq!(rebuild.step(), RebuildStep::RenameToTemp);
        assert_eq!(
            rebuild.advance().unwrap(),
            vec!["ALTER TABLE \"user\" RENAME TO \"user__temp_remove\"".to_string()]
        );
        assert_eq!(rebuild.step(), RebuildStep::DropIndexes);
        assert_eq!(
            rebuild.advance().unwrap(),
            vec![
                "DROP INDEX IF EXISTS \"uk_name\"".to_string(),
                "DROP INDEX IF EXISTS \"idx_legacy\"".to_string(),
            ]
        );
        let create = rebuild.advance().unwrap();
        assert!(create[0].starts_with("CREATE TABLE \"user\""));
        assert_eq!(
            rebuild.advance().unwrap(),
            vec![
                "INSERT INTO \"user\" (\"id\", \"name\", \"legacy\") SELECT \"id\", \"name\", \"legacy\" FROM \"user__temp_remove\""
                    .to_string()
            ]
        );
        assert_eq!(
            rebuild.advance().unwrap(),
            vec!["DROP TABLE \"user__temp_remove\"".to_string()]
        );
        assert_eq!(rebuild.step(), RebuildStep::Done);
        assert!(rebuild.advance().unwrap().is_empty());
        assert!(rebuild.advance().unwrap().is_empty());
    }

    #[test]
    fn test_live_only_columns_and_indexes_survive() {
        let dialect = SqliteDialect::new();
        let altered = altered();
        let rebuild = TableRebuild::new(&dialect, &altered);

        let target = rebuild.target();
        let columns: Vec<_> = target.columns.iter().map(|c| c.name.as_str()).collect();
        let indexes: Vec<_> = target.indexes.iter().map(|i| i.name.as_str()).collect();

        assert_eq!(columns, vec!["id", "name", "legacy"]);
        assert_eq!(target.column("name").unwrap().data_type, "varchar(128)");
        assert_eq!(indexes, vec!["uk_name", "idx_legacy"]);
    }
}
