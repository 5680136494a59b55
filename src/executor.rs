//! Query orchestration: split, open, run setup statements, run user
//! statements, close.
//!
//! Every step runs after the previous one has finished. The first failure
//! skips all remaining statements, but the session is always closed, and the
//! results gathered before the failure are handed back with the error.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::QueryError;
use crate::result::{QueryOutcome, ResultSet, StatementResult};
use crate::session::{Connector, Database};
use crate::sqlite::SqliteConnector;
use crate::statement::{split_statements, Statement};

/// Extra work a run does before the user's query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryExecutionOptions {
    /// Statements executed before the query, e.g. `ATTACH DATABASE ...` or
    /// `PRAGMA foreign_keys = ON`. They never produce results.
    #[serde(default)]
    pub sql: Vec<String>,
}

impl QueryExecutionOptions {
    pub fn new(sql: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            sql: sql.into_iter().map(Into::into).collect(),
        }
    }
}

enum Task<'a> {
    Setup(&'a str),
    Query(&'a Statement),
}

/// Runs query text against stores opened by a [`Connector`].
#[derive(Debug, Clone, Default)]
pub struct QueryExecutor<C = SqliteConnector> {
    connector: C,
}

impl<C: Connector> QueryExecutor<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    pub async fn execute_query(
        &self,
        path: impl AsRef<Path>,
        query: &str,
        options: &QueryExecutionOptions,
    ) -> QueryOutcome {
        let path = path.as_ref();

        let statements = match split_statements(query) {
            Ok(statements) => statements,
            Err(error) => {
                warn!(path = %path.display(), %error, "rejected query text");
                return QueryOutcome::new(Vec::new(), Some(error));
            }
        };

        let mut database = match self.connector.open(path).await {
            Ok(database) => database,
            Err(error) => return QueryOutcome::new(Vec::new(), Some(error)),
        };

        let tasks = options
            .sql
            .iter()
            .map(|sql| Task::Setup(sql.as_str()))
            .chain(statements.iter().map(Task::Query));
        let (result_set, mut error) = run_tasks(&mut database, tasks).await;

        if let Err(close_error) = database.close().await {
            match &error {
                Some(earlier) => warn!(
                    path = %path.display(),
                    error = %close_error,
                    %earlier,
                    "close failed after an earlier error; reporting the earlier error"
                ),
                None => error = Some(close_error),
            }
        }

        QueryOutcome::new(result_set, error)
    }
}

async fn run_tasks<'a, D: Database>(
    database: &mut D,
    tasks: impl Iterator<Item = Task<'a>>,
) -> (ResultSet, Option<QueryError>) {
    let mut result_set = ResultSet::new();

    for task in tasks {
        match task {
            Task::Setup(sql) => {
                debug!(statement = sql, "running setup statement");
                if let Err(error) = database.execute(sql).await {
                    let error = match error {
                        QueryError::Execution { statement, source } => {
                            QueryError::Setup { statement, source }
                        }
                        other => other,
                    };
                    warn!(statement = sql, %error, "setup statement failed");
                    return (result_set, Some(error));
                }
            }
            Task::Query(statement) => {
                debug!(statement = statement.sql(), "running statement");
                match database.execute(statement.sql()).await {
                    Ok(rows) => result_set.push(StatementResult::from_driver_rows(
                        statement.sql(),
                        rows,
                    )),
                    Err(error) => {
                        warn!(statement = statement.sql(), %error, "statement failed");
                        return (result_set, Some(error));
                    }
                }
            }
        }
    }

    (result_set, None)
}
