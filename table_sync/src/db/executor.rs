//! SQL executor
//!
//! Runs rendered statements one at a time, in order, stopping at the first
//! failure. Statements that already ran stay applied unless the batch is
//! wrapped in a transaction.

use async_trait::async_trait;
use sqlx::{Database, MySql, Pool, Postgres, Sqlite, Transaction};

use crate::db::connection::DatabaseConnection;
use crate::error::{Error, Result};

/// Something that can run a raw SQL statement
#[async_trait]
pub trait StatementRunner: Send {
    async fn execute_statement(&mut self, statement: &str) -> Result<()>;
}

macro_rules! impl_statement_runner {
    ($db:ty) => {
        #[async_trait]
        impl StatementRunner for Pool<$db> {
            async fn execute_statement(&mut self, statement: &str) -> Result<()> {
                sqlx::query(statement).execute(&*self).await?;
                Ok(())
            }
        }

        #[async_trait]
        impl StatementRunner for Transaction<'static, $db> {
            async fn execute_statement(&mut self, statement: &str) -> Result<()> {
                sqlx::query(statement).execute(&mut **self).await?;
                Ok(())
            }
        }
    };
}

impl_statement_runner!(Postgres);
impl_statement_runner!(MySql);
impl_statement_runner!(Sqlite);

/// Execute statements in order, stopping at the first failure
///
/// Returns the number of statements executed.
pub async fn execute_statements<R>(runner: &mut R, statements: &[String]) -> Result<usize>
where
    R: StatementRunner + ?Sized,
{
    for (position, statement) in statements.iter().enumerate() {
        tracing::info!(step = position + 1, statement = %statement, "executing statement");

        if let Err(e) = runner.execute_statement(statement).await {
            tracing::warn!(
                step = position + 1,
                statement = %statement,
                error = %e,
                "statement failed, skipping the rest of the run"
            );
            return Err(Error::StatementExecutionError {
                statement: statement.clone(),
                message: e.to_string(),
            });
        }
    }

    Ok(statements.len())
}

/// SQL executor bound to a connection
pub struct SqlExecutor {
    connection: DatabaseConnection,
}

impl SqlExecutor {
    /// Create a new SQL executor
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    /// Execute statements in order, each committing on its own
    pub async fn execute_batch(&self, statements: &[String]) -> Result<usize> {
        match &self.connection {
            DatabaseConnection::Postgres(pool) => execute_statements(&mut pool.clone(), statements).await,
            DatabaseConnection::MySql(pool) => execute_statements(&mut pool.clone(), statements).await,
            DatabaseConnection::Sqlite(pool) => execute_statements(&mut pool.clone(), statements).await,
        }
    }

    /// Execute statements inside one transaction, rolling back on failure
    pub async fn execute_in_transaction(&self, statements: &[String]) -> Result<usize> {
        match &self.connection {
            DatabaseConnection::Postgres(pool) => in_transaction(pool, statements).await,
            DatabaseConnection::MySql(pool) => in_transaction(pool, statements).await,
            DatabaseConnection::Sqlite(pool) => in_transaction(pool, statements).await,
        }
    }

    /// Get database connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}

async fn in_transaction<DB>(pool: &Pool<DB>, statements: &[String]) -> Result<usize>
where
    DB: Database,
    Transaction<'static, DB>: StatementRunner,
{
    let mut tx = pool.begin().await?;

    match execute_statements(&mut tx, statements).await {
        Ok(executed) => {
            tx.commit().await?;
            Ok(executed)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordingRunner {
        executed: Vec<String>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl StatementRunner for RecordingRunner {
        async fn execute_statement(&mut self, statement: &str) -> Result<()> {
            if self.fail_on.as_deref() == Some(statement) {
                return Err(Error::DatabaseError("duplicate column".to_string()));
            }
            self.executed.push(statement.to_string());
            Ok(())
        }
    }

    fn statements() -> Vec<String> {
        vec!["CREATE A".to_string(), "ALTER B".to_string(), "CREATE INDEX C".to_string()]
    }

    #[tokio::test]
    async fn test_runs_all_statements_in_order() {
        let mut runner = RecordingRunner::default();

        let executed = execute_statements(&mut runner, &statements()).await.unwrap();

        assert_eq!(executed, 3);
        assert_eq!(runner.executed, statements());
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let mut runner = RecordingRunner {
            fail_on: Some("ALTER B".to_string()),
            ..RecordingRunner::default()
        };

        let err = execute_statements(&mut runner, &statements()).await.unwrap_err();

        assert_eq!(runner.executed, vec!["CREATE A".to_string()]);
        match err {
            Error::StatementExecutionError { statement, message } => {
                assert_eq!(statement, "ALTER B");
                assert!(message.contains("duplicate column"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let mut runner = RecordingRunner::default();
        assert_eq!(execute_statements(&mut runner, &[]).await.unwrap(), 0);
    }
}
